//! String canonicalization shared by matching, deduplication and name checks.

/// Canonical form of a title: letters and digits only, lowercase, single-spaced.
///
/// Punctuation becomes a space so hyphenated words stay separate tokens. Combining
/// marks left behind by lowercasing (the dot of `İ`) are dropped.
pub fn normalize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| !is_combining_mark(*c))
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_combining_mark(c: char) -> bool {
    ('\u{0300}'..='\u{036F}').contains(&c)
}

/// Lowercases and folds Turkish and common Latin diacritics to ASCII.
pub fn fold(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .filter(|c| !is_combining_mark(*c))
        .map(|c| match c {
            'ı' | 'î' | 'í' | 'ì' | 'ï' => 'i',
            'ğ' => 'g',
            'ü' | 'û' | 'ú' | 'ù' => 'u',
            'ş' | 'ș' => 's',
            'ö' | 'ô' | 'ó' | 'ò' => 'o',
            'ç' => 'c',
            'â' | 'á' | 'à' | 'ä' | 'ã' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

/// Folded alphanumeric tokens of a personal name.
pub fn name_tokens(name: &str) -> Vec<String> {
    fold(name)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn honorific_key(token: &str) -> String {
    fold(token.trim_end_matches('.'))
}

/// Removes academic titles such as `Prof. Dr.` from a name.
pub fn strip_honorifics(name: &str, honorifics: &[String]) -> String {
    let keys: Vec<String> = honorifics.iter().map(|h| honorific_key(h)).collect();
    name.split_whitespace()
        .filter(|token| !keys.contains(&honorific_key(token)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether `text` mentions the first and last token of `name`, ignoring case and
/// diacritics.
pub fn mentions_name(text: &str, name: &str) -> bool {
    let tokens = name_tokens(name);
    let (Some(first), Some(last)) = (tokens.first(), tokens.last()) else {
        return false;
    };
    let haystack = fold(text);
    haystack.contains(first.as_str()) && haystack.contains(last.as_str())
}

/// Collapses runs of whitespace.
pub fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_basic() {
        assert_eq!(normalize("  Deep-Learning: A Survey! "), "deep learning a survey");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("!!!"), "");
        assert_eq!(normalize("İstanbul ÇALIŞMASI"), "istanbul çalişmasi");
    }

    #[test]
    fn test_normalize_idempotent() {
        for s in [
            "Advanced Radar Systems (2023)",
            "İĞDIR: Ölçüm/Analiz",
            "a\tb\n\nc",
            "x-y_z",
            "ÅNGSTRÖM ﬁeld",
        ] {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn test_fold_turkish() {
        assert_eq!(fold("Şükrü Ağaoğlu"), "sukru agaoglu");
        assert_eq!(fold("İLKAY"), "ilkay");
    }

    #[test]
    fn test_strip_honorifics() {
        let h: Vec<String> = ["Prof.", "Dr.", "Öğr.", "Üyesi"].iter().map(|s| s.to_string()).collect();
        assert_eq!(strip_honorifics("Prof. Dr. Ali Veli", &h), "Ali Veli");
        assert_eq!(strip_honorifics("Dr Öğr. Üyesi Ayşe Kaya", &h), "Ayşe Kaya");
        assert_eq!(strip_honorifics("Drew Barry", &h), "Drew Barry");
    }

    #[test]
    fn test_mentions_name() {
        assert!(mentions_name("PROF. DR. ŞÜKRÜ AĞAOĞLU - ODTÜ", "Şükrü Ağaoğlu"));
        assert!(mentions_name("Ali Mehmet Veli", "Ali Veli"));
        assert!(!mentions_name("Ali Yılmaz", "Ali Veli"));
        assert!(!mentions_name("anything", ""));
    }
}
