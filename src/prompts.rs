//! System prompts for vision-LLM table recognition.
//!
//! Callers can override the default via
//! [`crate::config::ExtractionConfig::system_prompt`]; the constants here are
//! used only when no override is provided. The reply format they ask for is
//! what [`crate::pipeline::postprocess::regions_from_reply`] parses.

/// Reply a model gives when the image holds no table.
pub const NO_TABLES_SENTINEL: &str = "NO_TABLES";

/// Default system prompt for transcribing the tables in an image.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a table-structure recognition engine. You receive one image of a document and transcribe every table in it as HTML.

Follow these rules precisely:

1. OUTPUT
   - Output one <table>...</table> element per table, in reading order
   - Output nothing else: no prose, no explanations, no markdown fences
   - If the image contains no table, output exactly NO_TABLES

2. STRUCTURE
   - One <tr> per visual row; one <td> per cell
   - Put header rows inside <thead> and use <th> for header cells
   - Put body rows inside <tbody>
   - Use colspan / rowspan for merged cells; never duplicate merged text
   - Close every element you open

3. CONTENT
   - Transcribe cell text exactly as printed, including units, signs and punctuation
   - Do not translate, summarise, reformat numbers or fill in empty cells
   - Escape &, < and > inside cell text as &amp;, &lt; and &gt;"#;

/// User-turn text carrying the language hint.
pub fn language_hint(lang: &str) -> String {
    format!("The document text is in language '{lang}'. Transcribe the tables in this image.")
}
