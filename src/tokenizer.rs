//! Tokenizer (quote-aware whitespace splitting) and canonicalizer
//! (`~`/`$VAR` expansion, quote/backslash stripping) producing argv
//! atoms, plus POSIX glob expansion.
//!
//! Grounded on the reference implementation's tokenizer/canonicalizer
//! (SPEC_FULL.md §4.6); the C `switch` quote-state fallthrough becomes
//! an explicit `QuoteState` enum (see DESIGN.md).

use crate::atom::{Atom, AtomTable};
use crate::env::Environment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    Unquoted,
    Single,
    Double,
}

/// A non-owning `(start, end)` byte range into the source line.
#[derive(Debug, Clone, Copy)]
pub struct Token {
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn bytes<'a>(&self, line: &'a [u8]) -> &'a [u8] {
        &line[self.start..self.end]
    }
}

/// Split `line` into whitespace-separated tokens, honoring quotes and
/// backslash escaping (even across quote boundaries).
pub fn tokenize(line: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0;
    let n = line.len();
    while i < n {
        while i < n && line[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= n {
            break;
        }
        let start = i;
        let mut quote = QuoteState::Unquoted;
        while i < n {
            let b = line[i];
            match quote {
                QuoteState::Unquoted => {
                    if b.is_ascii_whitespace() {
                        break;
                    }
                    if b == b'\'' {
                        quote = QuoteState::Single;
                    } else if b == b'"' {
                        quote = QuoteState::Double;
                    } else if b == b'\\' {
                        i += 1; // escape: next byte is literal, even a space
                    }
                }
                QuoteState::Single => {
                    if b == b'\'' {
                        quote = QuoteState::Unquoted;
                    } else if b == b'\\' {
                        i += 1;
                    }
                }
                QuoteState::Double => {
                    if b == b'"' {
                        quote = QuoteState::Unquoted;
                    } else if b == b'\\' {
                        i += 1;
                    }
                }
            }
            i += 1;
        }
        tokens.push(Token { start, end: i });
    }
    tokens
}

const IS_WINDOWS: bool = cfg!(windows);

fn is_varname_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Expand `~`, `$VAR`, strip quotes/backslashes from a raw token per
/// the left-to-right rules in SPEC_FULL.md §4.6.
pub fn canonicalize(token: &[u8], env: &mut Environment, at: &mut AtomTable) -> Vec<u8> {
    let mut out = Vec::with_capacity(token.len());
    let mut i = 0;
    let n = token.len();
    let mut quote = QuoteState::Unquoted;

    // Leading ~ expands to HOME if followed by end-of-token or a separator.
    if !token.is_empty() && token[0] == b'~' {
        let followed_by_sep = match token.get(1) {
            None => true,
            Some(&b'/') => true,
            Some(&b'\\') if IS_WINDOWS => true,
            _ => false,
        };
        if followed_by_sep {
            if let Some(home) = env.home() {
                out.extend_from_slice(home.as_bytes());
            }
            i = 1;
        }
    }

    while i < n {
        let b = token[i];
        match quote {
            QuoteState::Unquoted => match b {
                b'\'' => {
                    quote = QuoteState::Single;
                    i += 1;
                }
                b'"' => {
                    quote = QuoteState::Double;
                    i += 1;
                }
                b'$' => {
                    let mut j = i + 1;
                    while j < n && is_varname_byte(token[j]) {
                        j += 1;
                    }
                    let name = &token[i + 1..j];
                    if !name.is_empty() {
                        if let Ok(key) = at.atomize(name) {
                            if let Some(val) = env.get_env(at, &key) {
                                out.extend_from_slice(val.as_bytes());
                            }
                        }
                    }
                    i = j;
                }
                b'\\' => {
                    let next = token.get(i + 1).copied();
                    match next {
                        Some(b' ') | Some(b'"') | Some(b'\'') => {
                            out.push(next.unwrap());
                            i += 2;
                        }
                        Some(other) => {
                            out.push(b'\\');
                            out.push(other);
                            i += 2;
                        }
                        None => {
                            out.push(b'\\');
                            i += 1;
                        }
                    }
                }
                _ => {
                    out.push(b);
                    i += 1;
                }
            },
            QuoteState::Single => {
                if b == b'\'' {
                    quote = QuoteState::Unquoted;
                    i += 1;
                } else if b == b'\\' {
                    let next = token.get(i + 1).copied();
                    match next {
                        Some(b' ') | Some(b'"') | Some(b'\'') => {
                            out.push(next.unwrap());
                            i += 2;
                        }
                        Some(other) => {
                            out.push(b'\\');
                            out.push(other);
                            i += 2;
                        }
                        None => {
                            out.push(b'\\');
                            i += 1;
                        }
                    }
                } else {
                    out.push(b);
                    i += 1;
                }
            }
            QuoteState::Double => {
                if b == b'"' {
                    quote = QuoteState::Unquoted;
                    i += 1;
                } else if b == b'$' {
                    let mut j = i + 1;
                    while j < n && is_varname_byte(token[j]) {
                        j += 1;
                    }
                    let name = &token[i + 1..j];
                    if !name.is_empty() {
                        if let Ok(key) = at.atomize(name) {
                            if let Some(val) = env.get_env(at, &key) {
                                out.extend_from_slice(val.as_bytes());
                            }
                        }
                    }
                    i = j;
                } else if b == b'\\' {
                    let next = token.get(i + 1).copied();
                    match next {
                        Some(b' ') | Some(b'"') | Some(b'\'') => {
                            out.push(next.unwrap());
                            i += 2;
                        }
                        Some(other) => {
                            out.push(b'\\');
                            out.push(other);
                            i += 2;
                        }
                        None => {
                            out.push(b'\\');
                            i += 1;
                        }
                    }
                } else {
                    out.push(b);
                    i += 1;
                }
            }
        }
    }
    out
}

/// Expand a single canonicalized path that may contain glob
/// metacharacters into zero or more matches. POSIX-only per §4.6 — on
/// Windows this simply returns the input unchanged, since programs are
/// expected to expand their own wildcards there.
pub fn glob_expand(pattern: &[u8]) -> Vec<Vec<u8>> {
    if IS_WINDOWS {
        return vec![pattern.to_vec()];
    }
    #[cfg(unix)]
    {
        crate::glob_posix::glob_brace_nocheck(pattern)
    }
    #[cfg(not(unix))]
    {
        vec![pattern.to_vec()]
    }
}

/// Tokenize, canonicalize, glob-expand and atomize a full line into an
/// argv-style atom vector (without the trailing NULL sentinel, which
/// the dispatcher appends when building the raw argv for spawn).
pub fn line_to_argv(line: &[u8], env: &mut Environment, at: &mut AtomTable) -> Vec<Atom> {
    let mut argv = Vec::new();
    for tok in tokenize(line) {
        let canon = canonicalize(tok.bytes(line), env, at);
        for expanded in glob_expand(&canon) {
            if let Ok(atom) = at.atomize(&expanded) {
                argv.push(atom);
            }
        }
    }
    argv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv_strings(line: &str, env: &mut Environment, at: &mut AtomTable) -> Vec<String> {
        line_to_argv(line.as_bytes(), env, at)
            .iter()
            .map(|a| a.as_str().into_owned())
            .collect()
    }

    #[test]
    fn splits_on_whitespace() {
        let toks = tokenize(b"echo hello world");
        assert_eq!(toks.len(), 3);
    }

    #[test]
    fn quotes_preserve_internal_whitespace() {
        let toks = tokenize(b"echo \"hello world\"");
        assert_eq!(toks.len(), 2);
        assert_eq!(toks[1].bytes(b"echo \"hello world\""), b"\"hello world\"");
    }

    #[test]
    fn canonicalize_strips_quotes() {
        let mut at = AtomTable::new();
        let mut env = Environment::new(false);
        let out = canonicalize(b"\"hello world\"", &mut env, &mut at);
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn canonicalize_expands_dollar_var() {
        let mut at = AtomTable::new();
        let mut env = Environment::new(false);
        env.set_by_name(&mut at, "FOO", "bar");
        let out = canonicalize(b"$FOO", &mut env, &mut at);
        assert_eq!(out, b"bar");
    }

    #[test]
    fn canonicalize_unknown_var_expands_empty() {
        let mut at = AtomTable::new();
        let mut env = Environment::new(false);
        let out = canonicalize(b"$NOPE", &mut env, &mut at);
        assert_eq!(out, b"");
    }

    #[test]
    fn tilde_alone_expands_home() {
        let mut at = AtomTable::new();
        let mut env = Environment::new(false);
        env.set_by_name(&mut at, "HOME", "/home/x");
        let out = canonicalize(b"~", &mut env, &mut at);
        assert_eq!(out, b"/home/x");
    }

    #[test]
    fn tilde_with_path_expands_home_prefix() {
        let mut at = AtomTable::new();
        let mut env = Environment::new(false);
        env.set_by_name(&mut at, "HOME", "/home/x");
        let out = canonicalize(b"~/y", &mut env, &mut at);
        assert_eq!(out, b"/home/x/y");
    }

    #[test]
    fn backslash_space_strips_backslash() {
        let mut at = AtomTable::new();
        let mut env = Environment::new(false);
        let out = canonicalize(b"a\\ b", &mut env, &mut at);
        assert_eq!(out, b"a b");
    }

    #[test]
    fn backslash_other_byte_passes_through() {
        let mut at = AtomTable::new();
        let mut env = Environment::new(false);
        let out = canonicalize(b"a\\nb", &mut env, &mut at);
        assert_eq!(out, b"a\\nb");
    }

    #[test]
    fn full_line_to_argv() {
        let mut at = AtomTable::new();
        let mut env = Environment::new(false);
        env.set_by_name(&mut at, "HOME", "/home/x");
        let argv = argv_strings("cd ~/proj", &mut env, &mut at);
        assert_eq!(argv, vec!["cd", "/home/x/proj"]);
    }
}
