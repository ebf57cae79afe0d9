//! Short letter codes for addressing tasks from the keyboard

use std::collections::HashMap;

/// Collision-resolution rounds before residual ties are accepted
pub const MAX_ROUNDS: usize = 5;

/// Shortcut used when a label contains no letters at all
const FALLBACK: &str = "x";

/// First letter of every letter-run in `label`, lower-cased.
///
/// `"web dev server"` gives `"wds"`, `"@acme/api build"` gives `"aab"`.
pub fn initials(label: &str) -> String {
    let mut out = String::new();
    let mut in_word = false;
    for c in label.chars() {
        if c.is_alphabetic() {
            if !in_word {
                out.extend(c.to_lowercase());
            }
            in_word = true;
        } else {
            in_word = false;
        }
    }
    if out.is_empty() {
        out.push_str(FALLBACK);
    }
    out
}

/// Letters a shortcut grows through: the initials, then the rest of each
/// word's letters in order.
///
/// `"web"` gives `"web"`, `"web dev"` gives `"wdebev"`.
pub fn growth_letters(label: &str) -> String {
    let mut rest = String::new();
    let mut in_word = false;
    for c in label.chars() {
        if c.is_alphabetic() {
            if in_word {
                rest.extend(c.to_lowercase());
            }
            in_word = true;
        } else {
            in_word = false;
        }
    }
    let mut out = initials(label);
    out.push_str(&rest);
    out
}

/// Allocate one shortcut per label, in input order.
///
/// Every shortcut starts as the first initial. Each round, every member of a
/// colliding group takes one more letter: initials first, then the remaining
/// letters of its words. After [`MAX_ROUNDS`] rounds any remaining ties are
/// kept as they are; labels made of the same letters can never be told apart.
pub fn allocate<S: AsRef<str>>(labels: &[S]) -> Vec<String> {
    let letters: Vec<Vec<char>> = labels
        .iter()
        .map(|l| growth_letters(l.as_ref()).chars().collect())
        .collect();
    let mut lengths = vec![1usize; labels.len()];

    let shortcut = |i: usize, lengths: &[usize]| -> String {
        let len = lengths[i].min(letters[i].len());
        letters[i][..len].iter().collect()
    };

    for _ in 0..MAX_ROUNDS {
        let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
        for i in 0..labels.len() {
            groups.entry(shortcut(i, &lengths)).or_default().push(i);
        }

        let mut collided = false;
        for members in groups.values().filter(|m| m.len() > 1) {
            collided = true;
            for &i in members {
                lengths[i] += 1;
            }
        }
        if !collided {
            break;
        }
    }

    (0..labels.len()).map(|i| shortcut(i, &lengths)).collect()
}
