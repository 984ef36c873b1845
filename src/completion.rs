//! Filesystem tab-completion: directory enumeration, fuzzy scoring,
//! and cursor cycling through ranked candidates.
//!
//! Grounded on the reference implementation's completion engine
//! (SPEC_FULL.md §4.8).

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use crate::atom::{Atom, AtomTable};

/// The minimum number of byte-deletions from `haystack` needed so the
/// remaining bytes contain `needle` as a subsequence, or `None` if
/// `needle` is not a subsequence of `haystack` at all.
pub fn byte_expansion_distance(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    let mut ni = 0;
    let mut deletions = 0;
    for &h in haystack {
        if ni < needle.len() && needle[ni] == h {
            ni += 1;
        } else {
            deletions += 1;
        }
    }
    if ni == needle.len() {
        Some(deletions)
    } else {
        None
    }
}

fn lower(b: u8) -> u8 {
    b | 0x20
}

fn byte_expansion_distance_ci(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    let h: Vec<u8> = haystack.iter().map(|&b| lower(b)).collect();
    let n: Vec<u8> = needle.iter().map(|&b| lower(b)).collect();
    byte_expansion_distance(&h, &n)
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub atom: Atom,
    prefix_match: bool,
    iprefix_match: bool,
    distance: usize,
    idistance: usize,
}

fn score_candidate(atom: Atom, basename: &[u8]) -> Option<Candidate> {
    let bytes = atom.as_bytes();
    let prefix_match = bytes.starts_with(basename);
    let iprefix_match = {
        let a: Vec<u8> = bytes.iter().take(basename.len()).map(|&b| lower(b)).collect();
        let b: Vec<u8> = basename.iter().map(|&b| lower(b)).collect();
        a == b
    };
    let distance = byte_expansion_distance(bytes, basename)?;
    let idistance = byte_expansion_distance_ci(bytes, basename)?;
    Some(Candidate {
        atom,
        prefix_match,
        iprefix_match,
        distance,
        idistance,
    })
}

fn cmp_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.prefix_match
        .cmp(&a.prefix_match)
        .then(b.iprefix_match.cmp(&a.iprefix_match))
        .then(a.distance.cmp(&b.distance))
        .then(a.idistance.cmp(&b.idistance))
        .then(starts_with_dot(&a.atom).cmp(&starts_with_dot(&b.atom)))
        .then(a.atom.as_bytes().cmp(b.atom.as_bytes()))
}

fn starts_with_dot(atom: &Atom) -> bool {
    atom.as_bytes().first() == Some(&b'.')
}

/// Split `token` (the text being completed, honoring `\ ` as an
/// escaped space) into `(dirname, basename)`.
pub fn split_dirname_basename(token: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut last_sep = None;
    let mut i = 0;
    while i < token.len() {
        if token[i] == b'\\' && i + 1 < token.len() {
            i += 2;
            continue;
        }
        if token[i] == b'/' || (cfg!(windows) && token[i] == b'\\') {
            last_sep = Some(i);
        }
        i += 1;
    }
    match last_sep {
        Some(idx) => (token[..=idx].to_vec(), token[idx + 1..].to_vec()),
        None => (Vec::new(), token.to_vec()),
    }
}

/// Enumerate `dir` (directories-only when `dirs_only`) and rank every
/// entry against `basename`. The original basename atom is always
/// candidate 0.
pub fn build_candidates(
    at: &mut AtomTable,
    dir: &Path,
    basename: &[u8],
    dirs_only: bool,
) -> std::io::Result<Vec<Candidate>> {
    let mut scored = Vec::new();
    let original = at
        .atomize(basename)
        .expect("basename always fits the atom length bound");

    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(vec![Candidate {
                atom: original,
                prefix_match: true,
                iprefix_match: true,
                distance: 0,
                idistance: 0,
            }])
        }
        Err(e) => return Err(e),
    };

    for entry in read_dir.flatten() {
        let file_type = entry.file_type()?;
        let is_dir = if file_type.is_symlink() {
            entry.path().metadata().map(|m| m.is_dir()).unwrap_or(false)
        } else {
            file_type.is_dir()
        };
        if dirs_only && !is_dir {
            continue;
        }
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if is_dir {
            name.push('/');
        }
        let atom = at.atomize_str(&name).expect("filename fits atom length bound");
        if let Some(candidate) = score_candidate(atom, basename) {
            scored.push(candidate);
        }
    }

    scored.sort_by(cmp_candidates);
    let mut out = Vec::with_capacity(scored.len() + 1);
    out.push(Candidate {
        atom: original,
        prefix_match: true,
        iprefix_match: true,
        distance: 0,
        idistance: 0,
    });
    out.extend(scored);
    Ok(out)
}

/// Cursor over a ranked candidate list, plus the prefix to restore on
/// ESC.
pub struct CompletionState {
    pub active: bool,
    candidates: Vec<Candidate>,
    cursor: usize,
    pub dir: PathBuf,
    pub token_start: usize,
}

impl CompletionState {
    pub fn new() -> Self {
        CompletionState {
            active: false,
            candidates: Vec::new(),
            cursor: 0,
            dir: PathBuf::new(),
            token_start: 0,
        }
    }

    pub fn start(&mut self, candidates: Vec<Candidate>, dir: PathBuf, token_start: usize) {
        self.candidates = candidates;
        self.cursor = 0;
        self.dir = dir;
        self.token_start = token_start;
        self.active = true;
    }

    pub fn stop(&mut self) {
        self.active = false;
        self.candidates.clear();
        self.cursor = 0;
    }

    pub fn current(&self) -> Option<&Atom> {
        self.candidates.get(self.cursor).map(|c| &c.atom)
    }

    pub fn original(&self) -> Option<&Atom> {
        self.candidates.first().map(|c| &c.atom)
    }

    pub fn advance(&mut self) {
        if self.candidates.is_empty() {
            return;
        }
        self.cursor = (self.cursor + 1) % self.candidates.len();
    }

    pub fn retreat(&mut self) {
        if self.candidates.is_empty() {
            return;
        }
        self.cursor = (self.cursor + self.candidates.len() - 1) % self.candidates.len();
    }
}

impl Default for CompletionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_none_when_not_subsequence() {
        assert_eq!(byte_expansion_distance(b"banana", b"xyz"), None);
    }

    #[test]
    fn distance_counts_deletions() {
        assert_eq!(byte_expansion_distance(b"apple", b"ape"), Some(2));
        assert_eq!(byte_expansion_distance(b"apple", b"apple"), Some(0));
    }

    #[test]
    fn ranking_prefers_prefix_then_distance() {
        let mut at = AtomTable::new();
        let apple = at.atomize(b"apple").unwrap();
        let apricot = at.atomize(b"apricot").unwrap();
        let banana = at.atomize(b"banana").unwrap();
        let mut scored: Vec<Candidate> = [apple, apricot, banana]
            .into_iter()
            .filter_map(|a| score_candidate(a, b"a"))
            .collect();
        scored.sort_by(cmp_candidates);
        let names: Vec<String> = scored.iter().map(|c| c.atom.as_str().into_owned()).collect();
        assert_eq!(names, vec!["apple", "apricot", "banana"]);
    }

    #[test]
    fn split_dirname_basename_handles_escaped_space() {
        let (dir, base) = split_dirname_basename(b"foo/ba\\ r");
        assert_eq!(dir, b"foo/");
        assert_eq!(base, b"ba\\ r");
    }

    #[test]
    fn cycling_wraps_around() {
        let mut state = CompletionState::new();
        let mut at = AtomTable::new();
        let cands = vec![
            score_candidate(at.atomize(b"apple").unwrap(), b"a").unwrap(),
            score_candidate(at.atomize(b"apricot").unwrap(), b"a").unwrap(),
        ];
        state.start(cands, PathBuf::from("."), 0);
        assert_eq!(state.current().unwrap().as_str(), "apple");
        state.advance();
        assert_eq!(state.current().unwrap().as_str(), "apricot");
        state.advance();
        assert_eq!(state.current().unwrap().as_str(), "apple");
        state.retreat();
        assert_eq!(state.current().unwrap().as_str(), "apricot");
    }
}
