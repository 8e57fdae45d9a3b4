//! Case helpers offered for record fields and filename templates.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TextCase {
    /// First character upper case, everything else lower case.
    Sentence,
    /// Every space-separated word capitalized.
    Name,
    Upper,
    Lower,
}

impl TextCase {
    pub fn apply(self, text: &str) -> String {
        match self {
            TextCase::Sentence => capitalize(&text.to_lowercase()),
            TextCase::Name => text
                .to_lowercase()
                .split(' ')
                .map(capitalize)
                .collect::<Vec<_>>()
                .join(" "),
            TextCase::Upper => text.to_uppercase(),
            TextCase::Lower => text.to_lowercase(),
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentence_case_lowers_the_tail() {
        assert_eq!(TextCase::Sentence.apply("tHE hOBBIT"), "The hobbit");
        assert_eq!(TextCase::Sentence.apply(""), "");
    }

    #[test]
    fn name_case_keeps_spacing() {
        assert_eq!(TextCase::Name.apply("j. r. r.  TOLKIEN"), "J. R. R.  Tolkien");
        assert_eq!(TextCase::Name.apply("émile zola"), "Émile Zola");
    }

    #[test]
    fn upper_and_lower() {
        assert_eq!(TextCase::Upper.apply("Dune"), "DUNE");
        assert_eq!(TextCase::Lower.apply("Dune"), "dune");
    }
}
