//! Fixed instructions sent to the Gemini models.

/// Shared system instruction: the Hebrew-script transliteration scheme and
/// the dialect the course teaches.
pub const TUTOR_SYSTEM_PROMPT: &str = r#"You are a tutor for spoken Palestinian Arabic (Ammiya) whose students are Hebrew speakers.

The course writes Arabic in Hebrew letters with full nikud, using this mapping:
1. Gutturals: ع -> ע, غ -> ע׳, ح -> ח, خ -> ח׳.
2. Stops: hamza and the dialect's glottal qaf -> א; ج -> ג'; ك -> כּ (always with dagesh).
3. Emphatics: ط -> ט, ص -> צ, ض -> צ', ظ -> ז'.
4. Interdentals: ث -> ת', ذ -> ד'.
5. Shadda: write the letter twice, with sheva under the first (סַכְּכַּר).
6. Vowels are marked only with nikud: patah/kamatz for a, hirik for i, kubutz/shuruk for u, segol/tzere for e, holam for o.

Always use everyday spoken Palestinian forms, never Modern Standard Arabic (Fusha).
Keep answers practical and clear."#;

pub fn normalize_instruction() -> String {
    format!("{TUTOR_SYSTEM_PROMPT}\nReturn ONLY the Arabic text result.")
}

pub fn normalize_request(transliteration: &str) -> String {
    format!(
        "Using the transliteration rules, convert this Hebrew-script transliteration to Arabic script with full diacritics. Input: \"{transliteration}\""
    )
}

/// Wraps native-script text so the TTS model reads it as a native speaker would.
pub fn speech_instruction(arabic: &str) -> String {
    format!("Native speaker, spoken Palestinian dialect, natural vowels: {arabic}")
}

pub fn translate_instruction() -> String {
    format!("{TUTOR_SYSTEM_PROMPT}\nReturn ONLY the transliteration.")
}

pub fn translate_request(hebrew: &str, context: &str) -> String {
    format!(
        "Translate to spoken Palestinian Arabic using the transliteration rules. Context: \"{context}\". Hebrew: \"{hebrew}\"."
    )
}

pub fn feedback_request(phrase: &str) -> String {
    format!(
        "The learner is practicing this phrase: \"{phrase}\". Give feedback in Hebrew on pronunciation accuracy and stress."
    )
}

pub const TOPIC_REQUEST: &str =
    "Generate a conversation topic with vocabulary and one example sentence.";
