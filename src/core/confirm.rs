use std::io::{BufRead, Write};

/// Outcome of the confirmation gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Nothing is pending, no prompt was shown
    NotNeeded,
    Proceed,
    Declined,
}

/// Decide whether pending deletions may go ahead.
///
/// With `assume_yes` the prompt is skipped. Otherwise a single line is read
/// from `input`; only `y` or `yes` (any case) count as consent, and EOF or
/// an empty line is a decline.
pub fn confirm_deletion(
    pending: usize,
    assume_yes: bool,
    input: &mut dyn BufRead,
    out: &mut dyn Write,
) -> std::io::Result<Decision> {
    if pending == 0 {
        return Ok(Decision::NotNeeded);
    }
    if assume_yes {
        return Ok(Decision::Proceed);
    }

    write!(out, "Delete {pending} failing subdirectories? [y/N] ")?;
    out.flush()?;

    // Raw bytes: an answer that is not UTF-8 is a decline, not an error
    let mut raw = Vec::new();
    input.read_until(b'\n', &mut raw)?;
    writeln!(out)?;

    let answer = String::from_utf8_lossy(&raw);
    let answer = answer.trim();
    if answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes") {
        Ok(Decision::Proceed)
    } else {
        Ok(Decision::Declined)
    }
}
