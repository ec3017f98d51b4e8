use std::collections::HashMap;

use crate::error::DatasetError;
use crate::Result;

pub const BACKGROUND: &str = "__background__";
pub const CATCH_ALL: &str = "other";

const FISHCLEF_SPECIES: [&str; 15] = [
    "abudefduf vaigiensis",
    "acanthurus nigrofuscus",
    "amphiprion clarkii",
    "chaetodon lunulatus",
    "chaetodon speculum",
    "chaetodon trifascialis",
    "chromis chrysura",
    "dascyllus aruanus",
    "dascyllus reticulatus",
    "hemigymnus melapterus",
    "myripristis kuntee",
    "neoglyphidodon nigroris",
    "pempheris vanicolensis",
    "plectrogly-phidodon dickii",
    "zebrasoma scopas",
];

/// Ordered class names. Index 0 is always the background and the last entry is the
/// catch-all class every unknown name resolves to.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassTable {
    names: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl ClassTable {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let names: Vec<String> = names.iter().map(|n| n.as_ref().to_string()).collect();

        if names.len() < 2 {
            return Err(DatasetError::InvalidClassTable(format!(
                "need at least '{}' and '{}', got {} entries", BACKGROUND, CATCH_ALL, names.len())));
        }
        if !names[0].eq_ignore_ascii_case(BACKGROUND) {
            return Err(DatasetError::InvalidClassTable(format!(
                "index 0 must be '{}', found '{}'", BACKGROUND, names[0])));
        }
        if !names[names.len() - 1].eq_ignore_ascii_case(CATCH_ALL) {
            return Err(DatasetError::InvalidClassTable(format!(
                "last entry must be '{}', found '{}'", CATCH_ALL, names[names.len() - 1])));
        }

        let mut lookup = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if lookup.insert(normalize(name), i).is_some() {
                return Err(DatasetError::InvalidClassTable(format!("duplicate class '{}'", name)));
            }
        }

        Ok(Self { names, lookup })
    }

    /// The FishClef species table.
    pub fn fishclef() -> Self {
        let mut names = Vec::with_capacity(FISHCLEF_SPECIES.len() + 2);
        names.push(BACKGROUND);
        names.extend_from_slice(&FISHCLEF_SPECIES);
        names.push(CATCH_ALL);

        let lookup = names.iter().enumerate().map(|(i, n)| (n.to_string(), i)).collect();
        Self { names: names.into_iter().map(String::from).collect(), lookup }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn other_index(&self) -> usize {
        self.names.len() - 1
    }

    /// Case-insensitive lookup. Names not in the table resolve to the catch-all class.
    pub fn index_of(&self, name: &str) -> usize {
        match self.lookup.get(&normalize(name)) {
            Some(&i) => i,
            None => {
                log::trace!("Unknown class '{}' mapped to '{}'", name, CATCH_ALL);
                self.other_index()
            }
        }
    }

    /// Canonical name for an annotation label, after catch-all resolution.
    pub fn canonical_name(&self, name: &str) -> &str {
        &self.names[self.index_of(name)]
    }

    /// Every class except the background, with its index.
    pub fn foreground(&self) -> impl Iterator<Item = (usize, &str)> {
        self.names.iter().enumerate().skip(1).map(|(i, n)| (i, n.as_str()))
    }
}

impl Default for ClassTable {
    fn default() -> Self {
        Self::fishclef()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}
