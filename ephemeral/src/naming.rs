//! Unique ephemeral database names

use rand::seq::SliceRandom;
use rand::Rng;

/// Source of ephemeral database names
///
/// Every returned name must be a valid PostgreSQL identifier of at most 63
/// bytes, and distinct from every other name handed out for the lifetime of
/// the provisioner with overwhelming probability.
pub trait UniqueNameGenerator: Send + Sync {
    /// Produce a fresh database name
    fn generate(&self) -> String;
}

impl<F> UniqueNameGenerator for F
where
    F: Fn() -> String + Send + Sync,
{
    fn generate(&self) -> String {
        self()
    }
}

/// Names of the form `adjective_surname_0123456789ab`
///
/// The word pair keeps retained databases recognisable in `\l`; the 48-bit
/// random suffix is what makes them unique.
#[derive(Debug, Clone, Copy)]
pub struct WordPairNames {
    suffix_bytes: usize,
}

impl WordPairNames {
    /// Generator with the default 6-byte (12 hex character) suffix
    pub const fn new() -> Self {
        Self { suffix_bytes: 6 }
    }

    /// Generator with a custom random suffix length, clamped to 4..=16 bytes
    pub fn with_suffix_bytes(suffix_bytes: usize) -> Self {
        Self {
            suffix_bytes: suffix_bytes.clamp(4, 16),
        }
    }
}

impl Default for WordPairNames {
    fn default() -> Self {
        Self::new()
    }
}

impl UniqueNameGenerator for WordPairNames {
    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("eager");
        let surname = SURNAMES.choose(&mut rng).copied().unwrap_or("hopper");

        let mut suffix = vec![0u8; self.suffix_bytes];
        rng.fill(suffix.as_mut_slice());

        format!("{}_{}_{}", adjective, surname, hex::encode(suffix))
    }
}

const ADJECTIVES: &[&str] = &[
    "admiring", "adoring", "affectionate", "agitated", "amazing", "angry", "awesome",
    "beautiful", "blissful", "bold", "boring", "brave", "busy", "charming", "clever",
    "compassionate", "competent", "condescending", "confident", "cool", "cranky", "crazy",
    "dazzling", "determined", "distracted", "dreamy", "eager", "ecstatic", "elastic",
    "elated", "elegant", "eloquent", "epic", "exciting", "fervent", "festive", "flamboyant",
    "focused", "friendly", "frosty", "funny", "gallant", "gifted", "goofy", "gracious",
    "great", "happy", "hardcore", "heuristic", "hopeful", "hungry", "infallible",
    "inspiring", "intelligent", "interesting", "jolly", "jovial", "keen", "kind",
    "laughing", "loving", "lucid", "magical", "modest", "musing", "mystifying", "naughty",
    "nervous", "nice", "nifty", "nostalgic", "objective", "optimistic", "peaceful",
    "pedantic", "pensive", "practical", "priceless", "quirky", "quizzical", "recursing",
    "relaxed", "reverent", "romantic", "sad", "serene", "sharp", "silly", "sleepy",
    "stoic", "strange", "stupefied", "suspicious", "sweet", "tender", "thirsty",
    "trusting", "unruffled", "upbeat", "vibrant", "vigilant", "vigorous", "wizardly",
    "wonderful", "xenodochial", "youthful", "zealous", "zen",
];

const SURNAMES: &[&str] = &[
    "agnesi", "albattani", "allen", "archimedes", "ardinghelli", "aryabhata", "babbage",
    "banach", "bardeen", "bartik", "bell", "bhabha", "blackwell", "bohr", "booth",
    "borg", "bose", "boyd", "brahmagupta", "brattain", "brown", "cannon", "carson",
    "cerf", "chandrasekhar", "clarke", "colden", "cori", "cray", "curie", "darwin",
    "davinci", "diffie", "dijkstra", "dubinsky", "easley", "einstein", "elbakyan",
    "elgamal", "elion", "engelbart", "euclid", "euler", "faraday", "fermat", "fermi",
    "feynman", "franklin", "galileo", "gates", "goldberg", "goldstine", "goldwasser",
    "goodall", "hamilton", "haslett", "hawking", "heisenberg", "hellman", "hermann",
    "hodgkin", "hofstadter", "hoover", "hopper", "hugle", "hypatia", "jackson",
    "jemison", "jennings", "johnson", "joliot", "kalam", "kapitsa", "keldysh", "kepler",
    "khorana", "kilby", "knuth", "kowalevski", "lalande", "lamarr", "lamport", "leakey",
    "leavitt", "lehmann", "lewin", "lichterman", "liskov", "lovelace", "lumiere",
    "mahavira", "margulis", "matsumoto", "maxwell", "mccarthy", "mcclintock", "meitner",
    "mendel", "merkle", "mirzakhani", "moore", "morse", "napier", "nash", "neumann",
    "newton", "nobel", "noether", "northcutt", "noyce", "panini", "pascal", "pasteur",
    "payne", "perlman", "pike", "poincare", "ptolemy", "raman", "ramanujan", "ride",
    "ritchie", "robinson", "roentgen", "rosalind", "rubin", "saha", "sammet", "shannon",
    "shaw", "shirley", "shockley", "sinoussi", "snyder", "spence", "stonebraker",
    "sutherland", "swanson", "swartz", "tesla", "thompson", "torvalds", "turing",
    "varahamihira", "villani", "visvesvaraya", "volhard", "wescoff", "wiles",
    "williams", "wilson", "wing", "wozniak", "wright", "yalow", "yonath",
];

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    #[test]
    fn test_name_shape() {
        let name = WordPairNames::new().generate();
        let parts: Vec<&str> = name.split('_').collect();

        assert_eq!(parts.len(), 3, "unexpected name {}", name);
        assert!(ADJECTIVES.contains(&parts[0]));
        assert!(SURNAMES.contains(&parts[1]));
        assert_eq!(parts[2].len(), 12);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_names_fit_identifier_limit() {
        let longest_adjective = ADJECTIVES.iter().map(|w| w.len()).max().unwrap();
        let longest_surname = SURNAMES.iter().map(|w| w.len()).max().unwrap();
        let generator = WordPairNames::with_suffix_bytes(64);

        assert!(longest_adjective + longest_surname + 2 + generator.suffix_bytes * 2 <= 63);
    }

    #[test]
    fn test_names_are_lowercase_identifiers() {
        for word in ADJECTIVES.iter().chain(SURNAMES) {
            assert!(word.chars().all(|c| c.is_ascii_lowercase()), "bad word {}", word);
        }
    }

    #[test]
    fn test_no_collisions_across_many_draws() {
        let generator = WordPairNames::new();
        let names: HashSet<String> = (0..20_000).map(|_| generator.generate()).collect();
        assert_eq!(names.len(), 20_000);
    }

    #[test]
    fn test_closures_are_generators() {
        let fixed = || "fixed_name".to_string();
        assert_eq!(UniqueNameGenerator::generate(&fixed), "fixed_name");
    }
}
