//! Language tag routing
//!
//! External language tags are short ISO 639-1 codes ("hi", "ta", ...).
//! The translation model speaks FLORES-200 bridge codes ("hin_Deva"),
//! so every tag that can be translated must appear in the bridge table.
//! Tags outside the table degrade to pass-through, they never abort a
//! request.

/// The tag routed to the general-purpose recognition backend
pub const DEFAULT_LANGUAGE: &str = "en";

/// Map an external language tag to its bridge-vocabulary code.
///
/// Returns `None` for tags the translation model has no vocabulary for.
pub fn bridge_code(tag: &str) -> Option<&'static str> {
    match tag {
        "en" => Some("eng_Latn"),
        "hi" => Some("hin_Deva"),
        "ta" => Some("tam_Taml"),
        "te" => Some("tel_Telu"),
        "kn" => Some("kan_Knda"),
        "ml" => Some("mal_Mlym"),
        "mr" => Some("mar_Deva"),
        "bn" => Some("ben_Beng"),
        "gu" => Some("guj_Gujr"),
        "pa" => Some("pan_Guru"),
        _ => None,
    }
}

/// Whether a tag routes to the default (general-purpose) recognition backend
pub fn is_default_language(tag: &str) -> bool {
    tag.eq_ignore_ascii_case(DEFAULT_LANGUAGE)
}

/// All tags with a bridge-vocabulary mapping
pub fn supported_tags() -> &'static [&'static str] {
    &["en", "hi", "ta", "te", "kn", "ml", "mr", "bn", "gu", "pa"]
}
