/// Prompt templates rendered with minijinja.
///
/// Built-in templates are embedded at compile time. Any of them can be replaced
/// from the `prompts` config section; overrides are compiled at construction so
/// a broken template fails startup rather than the first query.

use minijinja::{context, Environment};
use serde::Serialize;

use crate::compress::ContextChunk;
use crate::config::PromptConfig;
use crate::errors::RagError;

const DECOMPOSE: &str = "decompose";
const HOP: &str = "hop";
const COMPRESS: &str = "compress";
const REASON: &str = "reason";
const FUSE: &str = "fuse";

#[derive(Serialize)]
struct HopEntry<'a> {
    index: usize,
    sub_question: &'a str,
    answer: &'a str,
}

pub struct PromptTemplates {
    env: Environment<'static>,
}

impl PromptTemplates {
    pub fn new(config: &PromptConfig) -> Result<Self, RagError> {
        let mut env = Environment::new();
        // Plain-text prompts.
        env.set_auto_escape_callback(|_| minijinja::AutoEscape::None);

        let templates = [
            (DECOMPOSE, &config.decompose, include_str!("templates/decompose.txt")),
            (HOP, &config.hop, include_str!("templates/hop.txt")),
            (COMPRESS, &config.compress, include_str!("templates/compress.txt")),
            (REASON, &config.reason, include_str!("templates/reason.txt")),
            (FUSE, &config.fuse, include_str!("templates/fuse.txt")),
        ];
        for (name, custom, builtin) in templates {
            match custom {
                Some(source) => {
                    tracing::debug!(template = name, "Using configured prompt template");
                    env.add_template_owned(name, source.clone())?;
                }
                None => env.add_template(name, builtin)?,
            }
        }

        Ok(PromptTemplates { env })
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String, RagError> {
        Ok(self.env.get_template(name)?.render(ctx)?)
    }

    pub fn decompose(&self, question: &str, max_sub_questions: usize) -> Result<String, RagError> {
        self.render(DECOMPOSE, context! { question, max_sub_questions })
    }

    pub fn hop(&self, sub_question: &str, context: &str) -> Result<String, RagError> {
        self.render(HOP, context! { sub_question, context })
    }

    pub fn compress(&self, query: &str, chunks: &[ContextChunk]) -> Result<String, RagError> {
        self.render(COMPRESS, context! { query, chunks })
    }

    pub fn reason(&self, query: &str, context: &str) -> Result<String, RagError> {
        self.render(REASON, context! { query, context })
    }

    /// `hops` are `(sub_question, answer)` pairs in sub-question order.
    pub fn fuse(&self, question: &str, hops: &[(String, String)]) -> Result<String, RagError> {
        let hops: Vec<HopEntry<'_>> = hops
            .iter()
            .enumerate()
            .map(|(i, (sub_question, answer))| HopEntry {
                index: i + 1,
                sub_question,
                answer,
            })
            .collect();
        self.render(FUSE, context! { question, hops })
    }
}
