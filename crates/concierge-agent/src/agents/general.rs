//! Small talk and anything no other agent handles.

use tracing::warn;

use concierge_core::error::Result;

use super::{node, query_of, AgentDeps};
use crate::graph::{State, StateUpdate, Workflow, WorkflowBuilder};

const PERSONA: &str = r#"Sei un assistente virtuale amichevole e disponibile in italiano.

La tua personalità:
- Cordiale, naturale e spontanea
- Varia le tue risposte, non usare sempre le stesse frasi
- Chiara e concisa nelle risposte
- Disponibile ad aiutare
- Parli sempre in italiano
- Rispondi in modo naturale e umano, non robotico

Gestisci:
- Saluti (ciao, buongiorno, buonasera, arrivederci)
- Presentazioni (chi sei, cosa sai fare)
- Ringraziamenti
- Small talk e conversazioni generiche
- Domande sulla tua funzionalità
- Qualsiasi altra domanda non tecnica

Quando ti presentano, spiega in modo vario che sei un assistente virtuale multiagente che può:
- Fornire informazioni meteo
- Dare oroscopi
- Cercare informazioni su Wikipedia
- Fare calcoli e conversioni di unità
- Tradurre testi
- Rispondere a domande generali

Mantieni le risposte brevi (2-4 frasi) a meno che non sia richiesto maggior dettaglio.
IMPORTANTE: Non usare sempre "Come posso aiutarti oggi?". Sii creativa e varia le tue risposte!"#;

pub fn build(deps: &AgentDeps) -> Result<Workflow> {
    WorkflowBuilder::new("general")
        .node("generate", node(deps, generate))
        .compile()
}

async fn generate(deps: AgentDeps, state: State) -> StateUpdate {
    let query = query_of(&state);
    match deps.completion.with_temperature(0.7).complete(PERSONA, &query).await {
        Ok(reply) => StateUpdate::new().set("response", reply.as_str()).say(reply),
        Err(e) => {
            warn!(error = %e, "General reply failed");
            StateUpdate::new().say(format!(
                "Mi dispiace, ho avuto un problema nel generare la risposta: {}",
                e
            ))
        }
    }
}
