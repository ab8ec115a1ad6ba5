//! The Leader (LDR) template (§3 `LeaderTemplate`, §4.2 `LDR:`/`LDR POS:`
//! lines).
//!
//! A Leader template carries only per-position *overrides*; everything else
//! is either a documented default, a structurally fixed character, or a
//! placeholder patched in later by the ISO 2709 encoder (record length at
//! 00–04, base address at 12–16). [`LeaderTemplate::render`] is called once
//! at DSL-parse time (per §4.2: "the Leader template... is rendered to its
//! 24-character form immediately and stored as a literal `fixed` string"),
//! so field population never re-derives it.

use std::collections::BTreeMap;

/// Length in bytes/characters of every MARC 21 leader.
pub const LEADER_LEN: usize = 24;

/// Placeholder character written at positions the ISO 2709 encoder patches
/// per record (00–04 length, 12–16 base address).
const PLACEHOLDER: char = '0';

/// Per-position overrides collected from `LDR POS: NN` / `OVERRIDE: v`
/// pairs while parsing the `MARC FIELD TEMPLATES` block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaderTemplate {
    overrides: BTreeMap<usize, char>,
}

impl LeaderTemplate {
    /// An empty template: only the documented defaults and fixed characters
    /// apply.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an override at `position`, taking precedence over both the
    /// default and the fixed structural characters at every position
    /// except the length/base-address placeholders, which the encoder
    /// always repatches regardless of any override recorded here.
    pub fn set_override(&mut self, position: usize, value: char) {
        self.overrides.insert(position, value);
    }

    /// Render the 24-character leader: defaults, then fixed structural
    /// characters, then overrides, with length/base-address positions left
    /// as `0`-filled placeholders for the encoder to patch.
    #[must_use]
    pub fn render(&self) -> String {
        let mut chars = [PLACEHOLDER; LEADER_LEN];

        // Documented defaults (§3).
        chars[5] = 'n';
        chars[6] = 'j';
        chars[7] = 'm';
        chars[17] = '1';

        // Structurally fixed characters (§3) — not overridable.
        chars[10] = '2';
        chars[11] = '2';
        chars[20] = '4';
        chars[21] = '5';
        chars[22] = '0';
        chars[23] = '0';

        for (&pos, &value) in &self.overrides {
            if matches!(pos, 10 | 11 | 20 | 21 | 22 | 23) {
                continue;
            }
            if pos < LEADER_LEN {
                chars[pos] = value;
            }
        }

        chars.iter().collect()
    }
}

/// Patch the record-length (00–04) and base-address (12–16) fields of an
/// already-rendered 24-character leader in place.
///
/// # Panics
///
/// Panics if `leader` is not exactly [`LEADER_LEN`] bytes — callers are
/// expected to have validated this already (P2).
pub fn patch_computed_fields(leader: &str, record_length: usize, base_address: usize) -> String {
    assert_eq!(leader.chars().count(), LEADER_LEN, "leader must be 24 characters");
    let mut chars: Vec<char> = leader.chars().collect();
    let length_str = format!("{record_length:05}");
    let base_str = format!("{base_address:05}");
    for (i, c) in length_str.chars().enumerate() {
        chars[i] = c;
    }
    for (i, c) in base_str.chars().enumerate() {
        chars[12 + i] = c;
    }
    chars.into_iter().collect()
}
