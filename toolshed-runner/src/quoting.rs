//! One quoting routine per consumer of generated command text.
//!
//! Each shell mode has exactly one quoting authority: POSIX shells (including
//! the Linux subsystem's `bash -lc`), PowerShell literal strings, and the
//! Windows `CommandLineToArgvW` convention used by most native executables.

use std::borrow::Cow;

/// Quote a word for a POSIX shell. Strings made of safe characters are
/// returned unchanged so generated commands stay readable.
pub fn posix_quote(value: &str) -> Cow<'_, str> {
    shell_escape::unix::escape(Cow::Borrowed(value))
}

/// Quote a value as a PowerShell single-quoted literal. Inside such a literal
/// only `'` is special, and it is escaped by doubling.
pub fn powershell_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            quoted.push('\'');
        }
        quoted.push(ch);
    }
    quoted.push('\'');
    quoted
}

/// Quote one argument following the `CommandLineToArgvW` rules: backslashes
/// are literal unless they precede a double quote.
pub fn windows_arg(value: &str) -> Cow<'_, str> {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|ch| matches!(ch, ' ' | '\t' | '\n' | '\x0b' | '"'));
    if !needs_quotes {
        return Cow::Borrowed(value);
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    let mut backslashes = 0usize;
    for ch in value.chars() {
        match ch {
            '\\' => backslashes += 1,
            '"' => {
                quoted.extend(std::iter::repeat_n('\\', backslashes * 2 + 1));
                quoted.push('"');
                backslashes = 0;
            }
            other => {
                quoted.extend(std::iter::repeat_n('\\', backslashes));
                quoted.push(other);
                backslashes = 0;
            }
        }
    }
    quoted.extend(std::iter::repeat_n('\\', backslashes * 2));
    quoted.push('"');
    Cow::Owned(quoted)
}

/// Wrap a command for `cmd.exe /s /c`. With `/s`, cmd strips exactly the
/// outermost pair of quotes and runs the rest verbatim, so the payload keeps
/// its own quoting untouched.
pub fn cmd_payload(command: &str) -> String {
    format!("\"{command}\"")
}
