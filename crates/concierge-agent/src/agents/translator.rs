//! Translator: extract text and languages, translate, format.

use std::sync::OnceLock;

use serde_json::{Map, Value};
use tracing::warn;

use concierge_core::error::Result;
use concierge_core::types::{Domain, MissingSlot};

use super::{analysis_failed, node, query_of, session_of, AgentDeps};
use crate::graph::{Edge, State, StateUpdate, Workflow, WorkflowBuilder, END};
use crate::nlu::{field_bool, field_str, DomainSchema, Extraction};

/// Language names accepted as source or target, with their ISO codes.
pub const SUPPORTED_LANGUAGES: [(&str, &str); 38] = [
    ("italiano", "it"),
    ("inglese", "en"),
    ("francese", "fr"),
    ("spagnolo", "es"),
    ("tedesco", "de"),
    ("portoghese", "pt"),
    ("russo", "ru"),
    ("cinese", "zh"),
    ("giapponese", "ja"),
    ("coreano", "ko"),
    ("arabo", "ar"),
    ("olandese", "nl"),
    ("polacco", "pl"),
    ("turco", "tr"),
    ("greco", "el"),
    ("svedese", "sv"),
    ("norvegese", "no"),
    ("danese", "da"),
    ("finlandese", "fi"),
    ("ceco", "cs"),
    ("rumeno", "ro"),
    ("ungherese", "hu"),
    ("hindi", "hi"),
    ("thai", "th"),
    ("vietnamita", "vi"),
    ("ebraico", "he"),
    ("indonesiano", "id"),
    ("malese", "ms"),
    ("ucraino", "uk"),
    ("catalano", "ca"),
    ("croato", "hr"),
    ("bulgaro", "bg"),
    ("slovacco", "sk"),
    ("sloveno", "sl"),
    ("serbo", "sr"),
    ("lituano", "lt"),
    ("lettone", "lv"),
    ("estone", "et"),
];

/// Source language value meaning "detect it".
pub const AUTO: &str = "auto";

const TEXT: &str = "text_to_translate";
const SOURCE: &str = "source_language";
const TARGET: &str = "target_language";
const TRANSLATED: &str = "translated_text";

const NOT_TRANSLATION: &str = "Non riesco a identificare una richiesta di traduzione valida. Prova con: 'traduci [testo] in [lingua]' o 'come si dice [testo] in [lingua]'";
const NO_TEXT: &str = "Non ho identificato il testo da tradurre. Puoi riformulare la richiesta?";
const TRANSLATOR_SYSTEM: &str = "Sei un traduttore professionale esperto in molteplici lingue. Fornisci traduzioni accurate, fluenti e contestualmente appropriate.";

/// Find the supported language a free-form name refers to.
///
/// Matches when either string contains the other, so "in inglese" and
/// "ingl" both resolve to "inglese". Blank input matches nothing.
pub fn match_language(name: &str) -> Option<&'static str> {
    let name = name.trim().to_lowercase();
    if name.is_empty() {
        return None;
    }
    SUPPORTED_LANGUAGES
        .iter()
        .map(|(lang, _)| *lang)
        .find(|lang| lang.contains(name.as_str()) || name.contains(lang))
}

fn language_list(n: usize) -> String {
    SUPPORTED_LANGUAGES
        .iter()
        .take(n)
        .map(|(lang, _)| *lang)
        .collect::<Vec<_>>()
        .join(", ")
}

fn schema() -> &'static DomainSchema {
    static SCHEMA: OnceLock<DomainSchema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        let template = r#"Analizza questa query in italiano ed estrai i dettagli della traduzione richiesta.

Lingue principali supportate: {languages}, e altre...

Query: {query}

Identifica:
1. Il testo da tradurre (può essere una parola, frase o più frasi)
2. La lingua di origine (se specificata, altrimenti "auto" per rilevamento automatico)
3. La lingua di destinazione

Rispondi in JSON con questo formato:
{
    "text": "testo da tradurre",
    "source_lang": "nome lingua origine o 'auto'",
    "target_lang": "nome lingua destinazione",
    "valid": true o false
}

Esempi:
- "traduci hello in italiano" -> {"text": "hello", "source_lang": "inglese", "target_lang": "italiano", "valid": true}
- "come si dice buongiorno in francese" -> {"text": "buongiorno", "source_lang": "italiano", "target_lang": "francese", "valid": true}
- "traduci questa frase in inglese: mi chiamo Paolo" -> {"text": "mi chiamo Paolo", "source_lang": "italiano", "target_lang": "inglese", "valid": true}
- "che significa thank you" -> {"text": "thank you", "source_lang": "auto", "target_lang": "italiano", "valid": true}
- "traduci in spagnolo: dove si trova la stazione" -> {"text": "dove si trova la stazione", "source_lang": "italiano", "target_lang": "spagnolo", "valid": true}

Se non è una richiesta di traduzione, metti "valid": false"#
            .replace("{languages}", &language_list(20));
        DomainSchema::new(
            "translator",
            "Sei un esperto nell'estrarre richieste di traduzione da testo in linguaggio naturale.",
            template,
        )
    })
}

/// Remove one pair of matching quotes the model may wrap its answer in.
fn strip_quotes(text: &str) -> &str {
    let text = text.trim();
    for q in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(q) && text.ends_with(q) {
            return &text[1..text.len() - 1];
        }
    }
    text
}

pub fn build(deps: &AgentDeps) -> Result<Workflow> {
    WorkflowBuilder::new("translator")
        .node("extract", node(deps, extract))
        .node("translate", node(deps, translate))
        .node("format", node(deps, format_translation))
        .edge(Edge::when_set("extract", "translate", TARGET))
        .edge(Edge::always("extract", END))
        .edge(Edge::when_set("translate", "format", TRANSLATED))
        .edge(Edge::always("translate", END))
        .entry("extract")
        .compile()
}

/// Sets [`TARGET`] only when both the text and a supported target are known.
async fn extract(deps: AgentDeps, state: State) -> StateUpdate {
    let query = query_of(&state);
    let fields = match deps.extractor.extract(&query, schema()).await {
        Extraction::Fields(fields) => fields,
        Extraction::Invalid { .. } => {
            return StateUpdate::new()
                .clear(TARGET)
                .say(analysis_failed("risposta non interpretabile"))
        }
        Extraction::Unavailable(reason) => {
            return StateUpdate::new().clear(TARGET).say(analysis_failed(&reason))
        }
    };

    if !field_bool(&fields, "valid").unwrap_or(false) {
        return StateUpdate::new().clear(TARGET).say(NOT_TRANSLATION);
    }

    let text = field_str(&fields, "text").unwrap_or_default();
    let source_raw = field_str(&fields, "source_lang").unwrap_or(AUTO).to_lowercase();
    let source = if source_raw == AUTO {
        AUTO.to_string()
    } else {
        match_language(&source_raw)
            .map(str::to_string)
            .unwrap_or(source_raw)
    };
    let target_raw = field_str(&fields, "target_lang").unwrap_or_default().to_lowercase();

    if target_raw.is_empty() && !text.is_empty() {
        let mut partial = Map::new();
        partial.insert(TEXT.into(), Value::from(text));
        deps.store.save_pending(
            &session_of(&state),
            Domain::Translation,
            query.as_str(),
            MissingSlot::Other(TARGET.into()),
            partial,
        );
        return StateUpdate::new()
            .clear(TARGET)
            .say(format!("In quale lingua vuoi tradurre \"{}\"?", text));
    }

    let Some(target) = match_language(&target_raw) else {
        return StateUpdate::new().clear(TARGET).say(format!(
            "Lingua di destinazione '{}' non riconosciuta. Lingue supportate: {}, ...",
            target_raw,
            language_list(10)
        ));
    };

    if text.is_empty() {
        return StateUpdate::new().clear(TARGET).say(NO_TEXT);
    }

    let source_display = if source == AUTO {
        "rilevamento automatico"
    } else {
        source.as_str()
    };
    let message = format!("Traduzione da {} a {} in corso...", source_display, target);
    StateUpdate::new()
        .set(TEXT, text)
        .set(SOURCE, source.as_str())
        .set(TARGET, target)
        .say(message)
}

async fn translate(deps: AgentDeps, state: State) -> StateUpdate {
    let text = state.get_str(TEXT).unwrap_or_default();
    let target = state.get_str(TARGET).unwrap_or_default();
    let source = state.get_str(SOURCE).unwrap_or(AUTO);

    let prompt = if source == AUTO {
        format!(
            "Traduci il seguente testo in {}. \nRileva automaticamente la lingua di origine e fornisci una traduzione accurata e naturale.\n\nTesto da tradurre:\n{}\n\nFornisci SOLO la traduzione, senza spiegazioni o note aggiuntive.",
            target, text
        )
    } else {
        format!(
            "Traduci il seguente testo da {} a {}.\nFornisci una traduzione accurata e naturale.\n\nTesto da tradurre:\n{}\n\nFornisci SOLO la traduzione, senza spiegazioni o note aggiuntive.",
            source, target, text
        )
    };

    match deps
        .completion
        .with_temperature(0.3)
        .complete(TRANSLATOR_SYSTEM, &prompt)
        .await
    {
        Ok(reply) => StateUpdate::new().set(TRANSLATED, strip_quotes(&reply)),
        Err(e) => {
            warn!(target, error = %e, "Translation failed");
            StateUpdate::new()
                .clear(TRANSLATED)
                .say(format!("Errore durante la traduzione: {}", e))
        }
    }
}

async fn format_translation(_deps: AgentDeps, state: State) -> StateUpdate {
    StateUpdate::new().say(format!(
        "🌍 Traduzione in {}:\n\n\"{}\"\n\nTesto originale: \"{}\"",
        state.get_str(TARGET).unwrap_or_default(),
        state.get_str(TRANSLATED).unwrap_or_default(),
        state.get_str(TEXT).unwrap_or_default(),
    ))
}
