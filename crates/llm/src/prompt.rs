//! Prompt building
//!
//! `PromptBuilder` assembles a `GenerateRequest` from a system prompt,
//! retrieved context, replayed history and the user message. `Templates`
//! holds the system prompt wording for each answer branch plus the
//! classifier and rewriter prompts.

use qa_assistant_core::{Document, GenerateRequest, Message, Turn, TurnRole};

/// Builds chat requests
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    system: String,
    context: Option<String>,
    history: Vec<Message>,
    user: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    json_mode: bool,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the system prompt
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system = prompt.into();
        self
    }

    /// Append retrieved documents to the system prompt under a `CONTESTO:` header
    pub fn with_context(mut self, documents: &[Document]) -> Self {
        if !documents.is_empty() {
            self.context = Some(format_documents(documents));
        }
        self
    }

    /// Replay prior turns as chat messages
    pub fn with_history(mut self, turns: &[Turn]) -> Self {
        self.history.extend(turns.iter().map(Message::from));
        self
    }

    pub fn user_message(mut self, content: impl Into<String>) -> Self {
        self.user = Some(content.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Ask for a JSON-only completion
    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub fn build(self) -> GenerateRequest {
        let system = match self.context {
            Some(context) => format!("{}\n\nCONTESTO:\n\n{}", self.system.trim_end(), context),
            None => self.system,
        };

        let mut request = GenerateRequest::new(system).with_json_mode(self.json_mode);
        request.messages.extend(self.history);
        if let Some(user) = self.user {
            request = request.with_user_message(user);
        }
        if let Some(t) = self.temperature {
            request = request.with_temperature(t);
        }
        if let Some(n) = self.max_tokens {
            request = request.with_max_tokens(n);
        }
        request
    }
}

/// Render documents as numbered context blocks, body text only
pub fn format_documents(documents: &[Document]) -> String {
    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            let mut block = format!("[{}]", i + 1);
            if let Some(title) = &doc.title {
                block.push_str(&format!(" {}", title));
            }
            if let Some(source) = &doc.source {
                block.push_str(&format!(" ({})", source));
            }
            block.push('\n');
            block.push_str(doc.body().trim());
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Render turns as a plain `Utente:` / `Assistente:` transcript
pub fn format_transcript(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| {
            let speaker = match t.role {
                TurnRole::User => "Utente",
                TurnRole::Assistant => "Assistente",
            };
            format!("{}: {}", speaker, t.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt wording for every LLM call the pipeline makes
#[derive(Debug, Clone)]
pub struct Templates {
    assistant_name: String,
    domain: String,
}

impl Templates {
    pub fn new(assistant_name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            assistant_name: assistant_name.into(),
            domain: domain.into(),
        }
    }

    fn persona(&self) -> String {
        format!(
            r#"Sei un assistente che risponde alle domande relative a: {domain}.
Rispondi in italiano, o nella lingua della domanda, e solo su argomenti legati a questo ambito.
Non rispondere a una domanda con un'altra domanda."#,
            domain = self.domain
        )
    }

    /// Small talk and out-of-corpus questions; history kept for tone
    pub fn conversational(&self, history: &[Turn], query: &str) -> GenerateRequest {
        let system = format!(
            r#"{persona}
Se la domanda non riguarda l'ambito, rispondi "Non so rispondere a questa domanda".
Se ti chiedono il tuo nome, ti chiami {name}.
Se l'utente ti ringrazia, rispondi con cortesia e renditi disponibile."#,
            persona = self.persona(),
            name = self.assistant_name
        );

        PromptBuilder::new()
            .system_prompt(system)
            .with_history(history)
            .user_message(query)
            .build()
    }

    /// Grounded answer over retrieved documents
    pub fn document(&self, query: &str, documents: &[Document]) -> GenerateRequest {
        let system = format!(
            r#"{persona}
Basa la risposta esclusivamente sui documenti seguenti, senza dire all'utente che li stai usando."#,
            persona = self.persona()
        );

        PromptBuilder::new()
            .system_prompt(system)
            .with_context(documents)
            .user_message(format!("DOMANDA: {}", query))
            .build()
    }

    /// Deepen a point from earlier in the conversation
    pub fn followup(&self, query: &str, documents: &[Document]) -> GenerateRequest {
        let system = format!(
            r#"{persona}
L'utente vuole approfondire un punto della conversazione con questa richiesta: "{query}".
Non ripetere la domanda e non dire che si tratta di un approfondimento.
Usa le informazioni seguenti."#,
            persona = self.persona(),
            query = query
        );

        PromptBuilder::new()
            .system_prompt(system)
            .with_context(documents)
            .user_message(query)
            .build()
    }

    /// Summary over the whole stored history
    pub fn summary(&self, history: &[Turn], query: &str) -> GenerateRequest {
        let system = format!(
            r#"Stai parlando con un utente e devi riassumere le informazioni di cui avete discusso.
La richiesta dell'utente è: "{query}".
Non ripetere la domanda. Rispondi in italiano, o nella lingua della domanda, usando solo la conversazione seguente.

CONVERSAZIONE:

{transcript}"#,
            query = query,
            transcript = format_transcript(history)
        );

        PromptBuilder::new()
            .system_prompt(system)
            .user_message(query)
            .build()
    }

    /// Intent label as `{"type": "..."}`
    pub fn classification(&self, query: &str) -> GenerateRequest {
        let system = r#"Classifica la domanda dell'utente in una di quattro categorie:
- "summary": chiede un riassunto della conversazione. Esempi: "Puoi fare un riassunto?", "Riassumi ciò di cui abbiamo parlato."
- "followup": dipende dagli ultimi messaggi. Esempi: "Dimmi di più", "Approfondisci questo punto", "Perché?", "Continua".
- "document": chiede di un argomento specifico senza bisogno dei messaggi precedenti. Esempi: "Come si accede all'Accademia?", "Quali sono i requisiti del bando?"
- "conversational": saluti e domande sull'assistente. Esempi: "Ciao", "Che cosa sai fare?", "Come ti chiami?"

Rispondi solo con un JSON, ad esempio {"type": "document"}."#;

        PromptBuilder::new()
            .system_prompt(system)
            .user_message(query)
            .temperature(0.0)
            .json()
            .build()
    }

    /// Standalone rewrite of an ambiguous query from the last turns
    pub fn rewrite(&self, recent: &[Turn], query: &str) -> GenerateRequest {
        let system = format!(
            r#"Devi riformulare la richiesta dell'utente in una domanda autonoma e più specifica, da usare per una ricerca nei documenti.
Non rispondere alla domanda. Non aggiungere informazioni che non compaiono nei messaggi.
Scrivi solo la nuova domanda.

Esempio:
- Richiesta: "Parlami di questa sezione"
  Ultimi messaggi: "Trovi maggiori informazioni nella sezione Servizi."
  Nuova domanda: "Parlami della sezione Servizi"

ULTIMI MESSAGGI:
{transcript}"#,
            transcript = format_transcript(recent)
        );

        PromptBuilder::new()
            .system_prompt(system)
            .user_message(query)
            .temperature(0.0)
            .build()
    }
}

impl Default for Templates {
    fn default() -> Self {
        Self::new("Turi", "Aeronautica Militare Italiana")
    }
}
