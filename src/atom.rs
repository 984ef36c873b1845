//! String interner: byte strings to stable, comparable handles.
//!
//! Mirrors the reference implementation's open-addressed atom table,
//! including the `index+1`/0-empty slot convention and the 0.8 load
//! factor rehash trigger. Handles are `Rc`-backed instead of raw
//! pointers recovered by header subtraction (see DESIGN.md).

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::errors::{DrshError, DrshResult};

const MURMUR_SEED: u32 = 0xFD80_0002;

struct AtomData {
    bytes: Vec<u8>,
    hash: u32,
    lowercase_twin: RefCell<Option<Atom>>,
}

/// A canonical, interned byte string. Cloning is a refcount bump;
/// equality is handle identity, not content comparison.
#[derive(Clone)]
pub struct Atom(Rc<AtomData>);

impl Atom {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0.bytes
    }

    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.0.bytes)
    }

    pub fn len(&self) -> usize {
        self.0.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.bytes.is_empty()
    }

    pub fn hash(&self) -> u32 {
        self.0.hash
    }

    /// The atom obtained by OR-ing every byte with 0x20. Self if already
    /// all-lowercase.
    pub fn lowercase_twin(&self, table: &mut AtomTable) -> Atom {
        if let Some(twin) = self.0.lowercase_twin.borrow().as_ref() {
            return twin.clone();
        }
        let lowered: Vec<u8> = self.0.bytes.iter().map(|b| b | 0x20).collect();
        let twin = if lowered == self.0.bytes {
            self.clone()
        } else {
            table.atomize(&lowered).expect("lowercasing never grows length")
        };
        *self.0.lowercase_twin.borrow_mut() = Some(twin.clone());
        twin
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Atom {}

impl PartialOrd for Atom {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Atom {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.bytes.cmp(&other.0.bytes)
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Atom({:?})", self.as_str())
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Open-addressed, linear-probe interning table.
pub struct AtomTable {
    atoms: Vec<Atom>,
    /// Slot i holds `position_in_atoms + 1`, or 0 if empty. Sized `2*cap`.
    slots: Vec<u32>,
    cap: usize,
}

fn crc32c_or_murmur(bytes: &[u8]) -> u32 {
    // Software MurmurHash3-32 fallback; hardware CRC32C acceleration is an
    // out-of-scope platform primitive per SPEC_FULL.md §4.1.
    let mut h = MURMUR_SEED;
    let mut i = 0;
    while i + 4 <= bytes.len() {
        let mut k = u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        k = k.wrapping_mul(0xcc9e_2d51);
        k = k.rotate_left(15);
        k = k.wrapping_mul(0x1b87_3593);
        h ^= k;
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe654_6b64);
        i += 4;
    }
    let tail = &bytes[i..];
    let mut k: u32 = 0;
    for (idx, &b) in tail.iter().enumerate() {
        k ^= (b as u32) << (8 * idx);
    }
    if !tail.is_empty() {
        k = k.wrapping_mul(0xcc9e_2d51);
        k = k.rotate_left(15);
        k = k.wrapping_mul(0x1b87_3593);
        h ^= k;
    }
    h ^= bytes.len() as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    if h == 0 {
        0xFFFF_FFFF
    } else {
        h
    }
}

/// Lemire's 32x32->high-32 multiply-reduce: maps a hash into `[0, n)`.
pub(crate) fn fast_range(hash: u32, n: usize) -> usize {
    (((hash as u64) * (n as u64)) >> 32) as usize
}

impl AtomTable {
    pub fn new() -> Self {
        let cap = 64;
        AtomTable {
            atoms: Vec::with_capacity(cap),
            slots: vec![0; cap * 2],
            cap,
        }
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    fn load_factor_exceeded(&self) -> bool {
        (self.atoms.len() as f64) >= 0.8 * (self.slots.len() as f64)
    }

    fn probe(&self, hash: u32, bytes: &[u8]) -> (usize, Option<usize>) {
        let nslots = self.slots.len();
        let mut slot = fast_range(hash, nslots);
        loop {
            let stored = self.slots[slot];
            if stored == 0 {
                return (slot, None);
            }
            let idx = (stored - 1) as usize;
            let atom = &self.atoms[idx];
            if atom.0.hash == hash && atom.0.bytes == bytes {
                return (slot, Some(idx));
            }
            slot = (slot + 1) % nslots;
        }
    }

    fn rehash(&mut self) {
        let new_cap = self.cap * 2;
        let mut new_slots = vec![0u32; new_cap * 2];
        for (idx, atom) in self.atoms.iter().enumerate() {
            let nslots = new_slots.len();
            let mut slot = fast_range(atom.0.hash, nslots);
            while new_slots[slot] != 0 {
                slot = (slot + 1) % nslots;
            }
            new_slots[slot] = (idx + 1) as u32;
        }
        self.cap = new_cap;
        self.slots = new_slots;
    }

    /// Intern `bytes`, returning the canonical atom.
    pub fn atomize(&mut self, bytes: &[u8]) -> DrshResult<Atom> {
        if bytes.len() as u64 >= (1u64 << 32) {
            return Err(DrshError::Value("atom length too large".into()));
        }
        let hash = crc32c_or_murmur(bytes);
        let (slot, found) = self.probe(hash, bytes);
        if let Some(idx) = found {
            return Ok(self.atoms[idx].clone());
        }
        let atom = Atom(Rc::new(AtomData {
            bytes: bytes.to_vec(),
            hash,
            lowercase_twin: RefCell::new(None),
        }));
        self.atoms.push(atom.clone());
        self.slots[slot] = self.atoms.len() as u32;
        if self.load_factor_exceeded() {
            self.rehash();
        }
        Ok(atom)
    }

    pub fn atomize_str(&mut self, s: &str) -> DrshResult<Atom> {
        self.atomize(s.as_bytes())
    }
}

impl Default for AtomTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_bytes_yield_same_handle() {
        let mut t = AtomTable::new();
        let a = t.atomize(b"hello").unwrap();
        let b = t.atomize(b"hello").unwrap();
        assert_eq!(a, b);
        let c = t.atomize(b"world").unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn lowercase_twin_self_references_when_already_lower() {
        let mut t = AtomTable::new();
        let a = t.atomize(b"already_lower").unwrap();
        let twin = a.lowercase_twin(&mut t);
        assert_eq!(a, twin);
    }

    #[test]
    fn lowercase_twin_points_at_lowered_atom() {
        let mut t = AtomTable::new();
        let upper = t.atomize(b"HELLO").unwrap();
        let lower = t.atomize(b"hello").unwrap();
        let twin = upper.lowercase_twin(&mut t);
        assert_eq!(twin, lower);
    }

    #[test]
    fn rehash_preserves_lookups_across_growth() {
        let mut t = AtomTable::new();
        let mut produced = Vec::new();
        for i in 0..500 {
            let s = format!("atom-{i}");
            produced.push((s.clone(), t.atomize(s.as_bytes()).unwrap()));
        }
        for (s, atom) in &produced {
            let again = t.atomize(s.as_bytes()).unwrap();
            assert_eq!(*atom, again);
        }
    }

    #[test]
    fn hash_is_never_zero() {
        // Regression: an input that would naturally hash to 0 must be
        // replaced with the fixed sentinel.
        assert_ne!(crc32c_or_murmur(b""), 0);
    }
}
