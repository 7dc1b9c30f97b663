//! Static language reference data.
//!
//! Languages are identified by a stable key (`"english"`, `"chinese"`, ...)
//! and carry the ISO 639 codes needed to match platform voices and
//! recognition locales, plus localized display names. The table is read-only
//! after construction.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumString};

/// Two-letter ISO 639-1 language codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
pub enum Iso639_1 {
    #[strum(serialize = "en")]
    English,
    #[strum(serialize = "zh")]
    Chinese,
    #[strum(serialize = "ko")]
    Korean,
    #[strum(serialize = "ja")]
    Japanese,
    #[strum(serialize = "es")]
    Spanish,
    #[strum(serialize = "fr")]
    French,
    #[strum(serialize = "uk")]
    Ukrainian,
    #[strum(serialize = "hi")]
    Hindi,
    #[strum(serialize = "bn")]
    Bengali,
    #[strum(serialize = "pt")]
    Portuguese,
    #[strum(serialize = "de")]
    German,
    #[strum(serialize = "ru")]
    Russian,
}

/// Three-letter ISO 639-3 language codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
pub enum Iso639_3 {
    #[strum(serialize = "eng")]
    English,
    #[strum(serialize = "zho")]
    Chinese,
    #[strum(serialize = "cmn")]
    Mandarin,
    #[strum(serialize = "yue")]
    Cantonese,
    #[strum(serialize = "cdo")]
    MinDong,
    #[strum(serialize = "kor")]
    Korean,
    #[strum(serialize = "jpn")]
    Japanese,
    #[strum(serialize = "spa")]
    Spanish,
    #[strum(serialize = "fra")]
    French,
    #[strum(serialize = "ukr")]
    Ukrainian,
    #[strum(serialize = "hin")]
    Hindi,
    #[strum(serialize = "ben")]
    Bengali,
    #[strum(serialize = "por")]
    Portuguese,
    #[strum(serialize = "deu")]
    German,
    #[strum(serialize = "rus")]
    Russian,
}

/// A supported language.
#[derive(Debug, Clone, PartialEq)]
pub struct Language {
    /// Stable identifier, also the wire representation.
    pub key: &'static str,
    /// The ISO 639-1 code of the language.
    pub iso1: Iso639_1,
    /// The ISO 639-3 codes of the languages grouped under this entry
    /// (e.g. Mandarin and Cantonese under Chinese). Never empty.
    pub includes: &'static [Iso639_3],
    names: HashMap<Iso639_3, &'static str>,
}

impl Language {
    fn new(
        key: &'static str,
        iso1: Iso639_1,
        includes: &'static [Iso639_3],
        names: &[(Iso639_3, &'static str)],
    ) -> Self {
        Self {
            key,
            iso1,
            includes,
            names: names.iter().copied().collect(),
        }
    }

    /// The name of this language written in the language identified by
    /// `code`, if known.
    pub fn name_in(&self, code: Iso639_3) -> Option<&'static str> {
        self.names.get(&code).copied()
    }
}

static LANGUAGES: Lazy<Vec<Language>> = Lazy::new(|| {
    use Iso639_3::*;
    vec![
        Language::new(
            "english",
            Iso639_1::English,
            &[Iso639_3::English],
            &[
                (English, "English"),
                (Chinese, "英语"),
                (Mandarin, "英语"),
                (Cantonese, "英文"),
                (Korean, "영어"),
                (Japanese, "英語"),
                (French, "Anglais"),
                (Spanish, "Inglés"),
                (Ukrainian, "Англійська"),
            ],
        ),
        Language::new(
            "chinese",
            Iso639_1::Chinese,
            &[Iso639_3::Chinese, Iso639_3::Mandarin, Iso639_3::Cantonese],
            &[
                (English, "Chinese"),
                (Chinese, "汉语"),
                (Mandarin, "汉语"),
                (Cantonese, "中文"),
                (Korean, "중국어"),
                (Japanese, "中国語"),
                (French, "Chinois"),
                (Spanish, "Chino"),
                (Ukrainian, "Китайська"),
            ],
        ),
        Language::new(
            "korean",
            Iso639_1::Korean,
            &[Iso639_3::Korean],
            &[
                (English, "Korean"),
                (Chinese, "韩语"),
                (Mandarin, "韩语"),
                (Cantonese, "韩语"),
                (Korean, "한국어"),
                (Japanese, "韓国語"),
                (French, "Coréen"),
                (Spanish, "Coreano"),
                (Ukrainian, "Корейська"),
            ],
        ),
        Language::new(
            "japanese",
            Iso639_1::Japanese,
            &[Iso639_3::Japanese],
            &[
                (English, "Japanese"),
                (Chinese, "日语"),
                (Mandarin, "日语"),
                (Cantonese, "日语"),
                (Korean, "일본어"),
                (Japanese, "日本語"),
                (French, "Japonais"),
                (Spanish, "Japonés"),
                (Ukrainian, "Японська"),
            ],
        ),
        Language::new(
            "french",
            Iso639_1::French,
            &[Iso639_3::French],
            &[
                (English, "French"),
                (Chinese, "法语"),
                (Mandarin, "法语"),
                (Cantonese, "法语"),
                (Korean, "프랑스어"),
                (Japanese, "フランス語"),
                (French, "Français"),
                (Spanish, "Francés"),
                (Ukrainian, "Французька"),
            ],
        ),
        Language::new(
            "spanish",
            Iso639_1::Spanish,
            &[Iso639_3::Spanish],
            &[
                (English, "Spanish"),
                (Chinese, "西班牙语"),
                (Mandarin, "西班牙语"),
                (Cantonese, "西班牙语"),
                (Korean, "스페인어"),
                (Japanese, "スペイン語"),
                (French, "Espagnol"),
                (Spanish, "Español"),
                (Ukrainian, "Іспанська"),
            ],
        ),
        Language::new(
            "ukrainian",
            Iso639_1::Ukrainian,
            &[Iso639_3::Ukrainian],
            &[
                (English, "Ukrainian"),
                (Chinese, "乌克兰语"),
                (Mandarin, "乌克兰语"),
                (Cantonese, "乌克兰语"),
                (Korean, "우크라이나어"),
                (Japanese, "ウクライナ語"),
                (French, "Ukrainien"),
                (Spanish, "Ucraniano"),
                (Ukrainian, "Українська"),
            ],
        ),
    ]
});

/// All supported languages, in display order.
pub fn all() -> &'static [Language] {
    LANGUAGES.as_slice()
}

/// Looks a language up by its stable key.
pub fn by_key(key: &str) -> Option<&'static Language> {
    LANGUAGES.iter().find(|language| language.key == key)
}

/// Resolves a BCP 47 / ISO language code to a supported language.
///
/// The region subtag is stripped before matching (`zh-CN` matches Chinese),
/// ISO 639-1 codes are tried first, then ISO 639-3 codes against each
/// language's `includes`. Unknown codes fall back to English.
pub fn by_code(code: &str) -> &'static Language {
    let bare = code.split('-').next().unwrap_or(code);

    if let Ok(iso1) = Iso639_1::from_str(bare) {
        if let Some(language) = LANGUAGES.iter().find(|language| language.iso1 == iso1) {
            return language;
        }
    }

    if let Ok(iso3) = Iso639_3::from_str(bare) {
        if let Some(language) = LANGUAGES
            .iter()
            .find(|language| language.includes.contains(&iso3))
        {
            return language;
        }
    }

    by_key("english").expect("english is always present")
}

/// The name of `target` written in `source`'s language.
///
/// Tries each of `source`'s ISO 639-3 codes until `target` carries a
/// localized name for one of them.
pub fn display_name(source: &Language, target: Option<&Language>) -> String {
    source
        .includes
        .iter()
        .find_map(|code| target.and_then(|t| t.name_in(*code)))
        .map(str::to_string)
        .unwrap_or_else(|| {
            format!(
                "{} has no name in {}",
                target.map_or("none", |t| t.key),
                source.key
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn by_key_finds_known_languages() {
        assert_eq!(by_key("spanish").unwrap().iso1, Iso639_1::Spanish);
        assert!(by_key("klingon").is_none());
    }

    #[test]
    fn by_code_strips_region_subtag() {
        assert_eq!(by_code("zh-CN").key, "chinese");
        assert_eq!(by_code("en-US").key, "english");
        assert_eq!(by_code("fr").key, "french");
    }

    #[test]
    fn by_code_falls_back_to_iso3_includes() {
        assert_eq!(by_code("cmn").key, "chinese");
        assert_eq!(by_code("yue").key, "chinese");
        assert_eq!(by_code("jpn").key, "japanese");
    }

    #[test]
    fn by_code_defaults_to_english_for_unknown() {
        assert_eq!(by_code("tlh").key, "english");
        assert_eq!(by_code("").key, "english");
    }

    #[test]
    fn display_names_are_localized() {
        let english = by_key("english").unwrap();
        let chinese = by_key("chinese").unwrap();
        let french = by_key("french").unwrap();

        // the name of English, written in Chinese
        assert_eq!(display_name(chinese, Some(english)), "英语");
        // the name of Chinese, written in English
        assert_eq!(display_name(english, Some(chinese)), "Chinese");
        assert_eq!(display_name(french, Some(french)), "Français");
    }

    #[test]
    fn display_name_falls_back_when_untranslated() {
        let english = by_key("english").unwrap();
        assert!(display_name(english, None).contains("none"));
    }

    #[test]
    fn every_language_groups_at_least_one_code() {
        for language in all() {
            assert!(
                !language.includes.is_empty(),
                "{} has no ISO 639-3 codes",
                language.key
            );
        }
    }
}
