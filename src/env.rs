//! Key/value atom map modeling the process environment.
//!
//! Backed by the same open-addressed, linear-probe structure as
//! `AtomTable` (SPEC_FULL.md §3): a growable `entries` store plus a
//! `slots` index sized `2*cap`, doubling at 0.8 load factor, reusing
//! `Atom::hash()` rather than rehashing key bytes. Entries themselves
//! are never reordered, so slot indices stay valid between rehashes;
//! the sorted view `set` prints from is a separate index permutation
//! computed on demand.

use crate::atom::{fast_range, Atom, AtomTable};

/// Well-known atom handles reserved at startup, mirroring the
/// reference implementation's `at->special[...]` table.
pub struct SpecialAtoms {
    pub cd: Atom,
    pub echo: Atom,
    pub exit: Atom,
    pub pwd: Atom,
    pub set: Atom,
    pub debug: Atom,
    pub source: Atom,
    pub dot: Atom,
    pub time: Atom,
    pub on: Atom,
    pub off: Atom,
    pub r#true: Atom,
    pub r#false: Atom,
    pub one: Atom,
    pub zero: Atom,
    pub home: Atom,
    pub path: Atom,
    pub pathext: Atom,
    pub columns: Atom,
    pub lines: Atom,
    pub term: Atom,
    pub user: Atom,
    pub shell: Atom,
    pub shlvl: Atom,
    pub drsh_history: Atom,
    pub drsh_config: Atom,
}

impl SpecialAtoms {
    pub fn new(at: &mut AtomTable) -> Self {
        macro_rules! a {
            ($s:expr) => {
                at.atomize_str($s).expect("special atom never fails to intern")
            };
        }
        SpecialAtoms {
            cd: a!("cd"),
            echo: a!("echo"),
            exit: a!("exit"),
            pwd: a!("pwd"),
            set: a!("set"),
            debug: a!("debug"),
            source: a!("source"),
            dot: a!("."),
            time: a!("time"),
            on: a!("on"),
            off: a!("off"),
            r#true: a!("true"),
            r#false: a!("false"),
            one: a!("1"),
            zero: a!("0"),
            home: a!("HOME"),
            path: a!("PATH"),
            pathext: a!("PATHEXT"),
            columns: a!("COLUMNS"),
            lines: a!("LINES"),
            term: a!("TERM"),
            user: a!("USER"),
            shell: a!("SHELL"),
            shlvl: a!("SHLVL"),
            drsh_history: a!("DRSH_HISTORY"),
            drsh_config: a!("DRSH_CONFIG"),
        }
    }
}

/// Key/value atom map, open-addressed like `AtomTable`. Case-insensitive
/// lookup is enabled on Windows, where the lowercase twin of a key is
/// used both for hashing and for the final comparison.
pub struct Environment {
    entries: Vec<(Atom, Atom)>,
    /// Slot i holds `position_in_entries + 1`, or 0 if empty. Sized `2*cap`.
    slots: Vec<u32>,
    cap: usize,
    case_insensitive: bool,
    /// Index permutation into `entries`, sorted by key bytes. Valid
    /// only while `sorted` is true.
    order: Vec<u32>,
    sorted: bool,
    home: Option<Atom>,
    pub debug: bool,
}

impl Environment {
    pub fn new(case_insensitive: bool) -> Self {
        let cap = 16;
        Environment {
            entries: Vec::new(),
            slots: vec![0; cap * 2],
            cap,
            case_insensitive,
            order: Vec::new(),
            sorted: true,
            home: None,
            debug: false,
        }
    }

    /// Load the inherited process environment into atoms.
    pub fn init_from_process(at: &mut AtomTable, case_insensitive: bool) -> Self {
        let mut env = Environment::new(case_insensitive);
        for (k, v) in std::env::vars_os() {
            let k = k.to_string_lossy();
            let v = v.to_string_lossy();
            let ka = at.atomize_str(&k).expect("env key interns");
            let va = at.atomize_str(&v).expect("env value interns");
            env.set_raw(at, ka, va);
        }
        env.home = env.get_by_name(at, "HOME");
        env
    }

    fn key_fold_hash(&self, at: &mut AtomTable, key: &Atom) -> u32 {
        if self.case_insensitive {
            key.lowercase_twin(at).hash()
        } else {
            key.hash()
        }
    }

    fn key_eq(&self, at: &mut AtomTable, a: &Atom, b: &Atom) -> bool {
        if a == b {
            return true;
        }
        if !self.case_insensitive {
            return false;
        }
        a.lowercase_twin(at) == b.lowercase_twin(at)
    }

    fn load_factor_exceeded(&self) -> bool {
        (self.entries.len() as f64) >= 0.8 * (self.slots.len() as f64)
    }

    /// Find `key`'s slot; `Some(idx)` is its position in `entries` if
    /// already present, `None` if the returned slot is free.
    fn probe(&self, at: &mut AtomTable, hash: u32, key: &Atom) -> (usize, Option<usize>) {
        let nslots = self.slots.len();
        let mut slot = fast_range(hash, nslots);
        loop {
            let stored = self.slots[slot];
            if stored == 0 {
                return (slot, None);
            }
            let idx = (stored - 1) as usize;
            if self.key_eq(at, &self.entries[idx].0, key) {
                return (slot, Some(idx));
            }
            slot = (slot + 1) % nslots;
        }
    }

    fn rehash(&mut self, at: &mut AtomTable) {
        let new_cap = self.cap * 2;
        let mut new_slots = vec![0u32; new_cap * 2];
        for idx in 0..self.entries.len() {
            let hash = self.key_fold_hash(at, &self.entries[idx].0);
            let nslots = new_slots.len();
            let mut slot = fast_range(hash, nslots);
            while new_slots[slot] != 0 {
                slot = (slot + 1) % nslots;
            }
            new_slots[slot] = (idx + 1) as u32;
        }
        self.cap = new_cap;
        self.slots = new_slots;
    }

    fn set_raw(&mut self, at: &mut AtomTable, key: Atom, value: Atom) {
        let hash = self.key_fold_hash(at, &key);
        let (slot, found) = self.probe(at, hash, &key);
        if let Some(idx) = found {
            self.entries[idx].1 = value;
            self.sorted = false;
            return;
        }
        self.entries.push((key, value));
        self.slots[slot] = self.entries.len() as u32;
        self.sorted = false;
        if self.load_factor_exceeded() {
            self.rehash(at);
        }
    }

    pub fn set_env(&mut self, at: &mut AtomTable, key: &Atom, value: &Atom) {
        self.set_raw(at, key.clone(), value.clone());
    }

    pub fn get_env(&self, at: &mut AtomTable, key: &Atom) -> Option<Atom> {
        let hash = self.key_fold_hash(at, key);
        let (_, found) = self.probe(at, hash, key);
        found.map(|idx| self.entries[idx].1.clone())
    }

    pub fn get_by_name(&mut self, at: &mut AtomTable, name: &str) -> Option<Atom> {
        let key = at.atomize_str(name).ok()?;
        self.get_env(at, &key)
    }

    pub fn set_by_name(&mut self, at: &mut AtomTable, name: &str, value: &str) {
        let key = at.atomize_str(name).expect("env key interns");
        let val = at.atomize_str(value).expect("env value interns");
        if name == "HOME" {
            self.home = Some(val.clone());
        }
        self.set_env(at, &key, &val);
    }

    pub fn home(&self) -> Option<&Atom> {
        self.home.as_ref()
    }

    /// Recompute the key-sorted index permutation for `set`-with-no-args
    /// display. Entries themselves are never reordered, so the `slots`
    /// index stays valid.
    pub fn sort_env(&mut self) {
        if self.sorted {
            return;
        }
        let mut order: Vec<u32> = (0..self.entries.len() as u32).collect();
        order.sort_by(|&a, &b| {
            self.entries[a as usize].0.as_bytes().cmp(self.entries[b as usize].0.as_bytes())
        });
        self.order = order;
        self.sorted = true;
    }

    pub fn iter_sorted(&mut self) -> impl Iterator<Item = &(Atom, Atom)> {
        self.sort_env();
        let entries = &self.entries;
        self.order.iter().map(move |&i| &entries[i as usize])
    }

    /// Serialize to `KEY=VALUE\0KEY=VALUE\0...\0` for spawning a child
    /// on either platform envp convention.
    pub fn to_envp_block(&mut self) -> Vec<u8> {
        self.sort_env();
        let mut out = Vec::new();
        for &i in &self.order {
            let (k, v) = &self.entries[i as usize];
            out.extend_from_slice(k.as_bytes());
            out.push(b'=');
            out.extend_from_slice(v.as_bytes());
            out.push(0);
        }
        out
    }

    /// Parse `SHLVL`, defaulting missing/non-numeric values to 0, and
    /// write back `SHLVL+1`.
    pub fn increment_shlvl(&mut self, at: &mut AtomTable) {
        let current = self
            .get_by_name(at, "SHLVL")
            .and_then(|a| a.as_str().parse::<u32>().ok())
            .unwrap_or(0);
        self.set_by_name(at, "SHLVL", &(current + 1).to_string());
    }

    pub fn set_shell_path(&mut self, at: &mut AtomTable, path: &str) {
        self.set_by_name(at, "SHELL", path);
    }

    pub fn refresh_size(&mut self, at: &mut AtomTable, cols: u16, lines: u16) {
        self.set_by_name(at, "COLUMNS", &cols.to_string());
        self.set_by_name(at, "LINES", &lines.to_string());
    }

    pub fn pairs(&self) -> &[(Atom, Atom)] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_roundtrip() {
        let mut at = AtomTable::new();
        let mut env = Environment::new(false);
        env.set_by_name(&mut at, "FOO", "bar");
        assert_eq!(env.get_by_name(&mut at, "FOO").unwrap().as_str(), "bar");
    }

    #[test]
    fn case_insensitive_lookup_on_windows_mode() {
        let mut at = AtomTable::new();
        let mut env = Environment::new(true);
        env.set_by_name(&mut at, "Path", "/bin");
        assert_eq!(env.get_by_name(&mut at, "PATH").unwrap().as_str(), "/bin");
    }

    #[test]
    fn case_sensitive_lookup_elsewhere() {
        let mut at = AtomTable::new();
        let mut env = Environment::new(false);
        env.set_by_name(&mut at, "Path", "/bin");
        assert!(env.get_by_name(&mut at, "PATH").is_none());
    }

    #[test]
    fn shlvl_defaults_missing_to_zero() {
        let mut at = AtomTable::new();
        let mut env = Environment::new(false);
        env.increment_shlvl(&mut at);
        assert_eq!(env.get_by_name(&mut at, "SHLVL").unwrap().as_str(), "1");
    }

    #[test]
    fn shlvl_treats_non_numeric_as_zero() {
        let mut at = AtomTable::new();
        let mut env = Environment::new(false);
        env.set_by_name(&mut at, "SHLVL", "not-a-number");
        env.increment_shlvl(&mut at);
        assert_eq!(env.get_by_name(&mut at, "SHLVL").unwrap().as_str(), "1");
    }

    #[test]
    fn rehash_preserves_lookups_across_growth() {
        let mut at = AtomTable::new();
        let mut env = Environment::new(false);
        for i in 0..200 {
            env.set_by_name(&mut at, &format!("VAR_{i}"), &i.to_string());
        }
        for i in 0..200 {
            assert_eq!(env.get_by_name(&mut at, &format!("VAR_{i}")).unwrap().as_str(), i.to_string());
        }
    }

    #[test]
    fn set_overwrites_existing_key_in_place() {
        let mut at = AtomTable::new();
        let mut env = Environment::new(false);
        env.set_by_name(&mut at, "FOO", "one");
        env.set_by_name(&mut at, "FOO", "two");
        assert_eq!(env.pairs().len(), 1);
        assert_eq!(env.get_by_name(&mut at, "FOO").unwrap().as_str(), "two");
    }

    #[test]
    fn iter_sorted_orders_by_key_bytes() {
        let mut at = AtomTable::new();
        let mut env = Environment::new(false);
        env.set_by_name(&mut at, "ZEBRA", "1");
        env.set_by_name(&mut at, "APPLE", "2");
        env.set_by_name(&mut at, "MANGO", "3");
        let keys: Vec<String> = env.iter_sorted().map(|(k, _)| k.as_str().into_owned()).collect();
        assert_eq!(keys, vec!["APPLE", "MANGO", "ZEBRA"]);
    }
}
