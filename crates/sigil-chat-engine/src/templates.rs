use lazy_static::lazy_static;
use minijinja::{context, Environment, Error, ErrorKind};
use regex::Regex;
use sigil_chat_types::Message;
use std::fmt::Write;

use crate::error::EngineError;
use crate::prompt::ChatTemplateRenderer;

const TEMPLATE_NAME: &str = "chat_template";

lazy_static! {
    static ref ENDSWITH_CALL: Regex = Regex::new(r"\.endswith\(").unwrap();
    static ref STARTSWITH_CALL: Regex = Regex::new(r"\.startswith\(").unwrap();
}

/// Rewrite Python-isms found in GGUF chat templates into minijinja syntax:
/// - `tojson(ensure_ascii=...)` → `tojson`
/// - `.endswith(x)` / `.startswith(x)` → `is endingwith(x)` / `is startingwith(x)`
/// - `.strip()` → `| trim`
/// - `.items()` → `| items`
fn preprocess_template(template: &str) -> String {
    let result = template
        .replace("tojson(ensure_ascii=False)", "tojson")
        .replace("tojson(ensure_ascii=True)", "tojson");
    let result = ENDSWITH_CALL.replace_all(&result, " is endingwith(");
    let result = STARTSWITH_CALL.replace_all(&result, " is startingwith(");
    result.replace(".strip()", " | trim").replace(".items()", " | items")
}

fn environment(source: &str) -> Result<Environment<'_>, Error> {
    let mut env = Environment::new();

    // raise_exception(msg): templates use it to reject unsupported role orders
    env.add_function("raise_exception", |msg: String| -> Result<String, Error> {
        Err(Error::new(ErrorKind::InvalidOperation, msg))
    });

    // strftime_now(fmt): current local date, used by Mistral/Llama 3 templates
    env.add_function("strftime_now", |fmt: String| -> String {
        let mut out = String::new();
        if write!(out, "{}", chrono::Local::now().format(&fmt)).is_err() {
            out = chrono::Local::now().format("%Y-%m-%d").to_string();
        }
        out
    });

    env.add_template(TEMPLATE_NAME, source)?;
    Ok(env)
}

/// A Jinja chat template read from model metadata, rendered with minijinja.
#[derive(Debug, Clone)]
pub struct JinjaChatTemplate {
    source: String,
    bos_token: String,
    eos_token: String,
}

impl JinjaChatTemplate {
    /// Preprocess and compile-check `template`. Fails if minijinja can't parse it.
    pub fn new(
        template: &str,
        bos_token: impl Into<String>,
        eos_token: impl Into<String>,
    ) -> Result<Self, EngineError> {
        let source = preprocess_template(template);
        environment(&source).map_err(|e| EngineError::Template(format!("failed to parse chat template: {e}")))?;
        Ok(Self {
            source,
            bos_token: bos_token.into(),
            eos_token: eos_token.into(),
        })
    }
}

impl ChatTemplateRenderer for JinjaChatTemplate {
    fn render(&self, messages: &[Message], add_generation_prompt: bool) -> Result<String, EngineError> {
        let env = environment(&self.source)
            .map_err(|e| EngineError::Template(format!("failed to parse chat template: {e}")))?;
        let template = env
            .get_template(TEMPLATE_NAME)
            .map_err(|e| EngineError::Template(e.to_string()))?;

        template
            .render(context! {
                messages => messages,
                add_generation_prompt => add_generation_prompt,
                bos_token => &self.bos_token,
                eos_token => &self.eos_token,
                // Some templates (GLM, Qwen3) open a <think> block when this is undefined
                enable_thinking => false,
            })
            .map_err(|e| EngineError::Template(format!("failed to render chat template: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHATML: &str = "{% for message in messages %}<|im_start|>{{ message['role'] }}\n{{ message['content'] }}<|im_end|>\n{% endfor %}{% if add_generation_prompt %}<|im_start|>assistant\n{% endif %}";

    #[test]
    fn test_preprocess_python_methods() {
        let src = "{% if m.content.strip().endswith('?') and m.role.startswith('u') %}{{ x|tojson(ensure_ascii=False) }}{% endif %}";
        let out = preprocess_template(src);
        assert!(out.contains(" | trim is endingwith('?')"));
        assert!(out.contains(" is startingwith('u')"));
        assert!(out.contains("|tojson }}"));
        assert!(!out.contains("ensure_ascii"));
    }

    #[test]
    fn test_render_chatml_with_generation_prompt() {
        let template = JinjaChatTemplate::new(CHATML, "", "<|im_end|>").unwrap();
        let out = template
            .render(&[Message::system("S"), Message::user("hi")], true)
            .unwrap();
        assert_eq!(
            out,
            "<|im_start|>system\nS<|im_end|>\n<|im_start|>user\nhi<|im_end|>\n<|im_start|>assistant\n"
        );
    }

    #[test]
    fn test_render_uses_bos_token() {
        let template = JinjaChatTemplate::new(
            "{{ bos_token }}{% for m in messages %}[{{ m.role }}]{{ m.content }}{% endfor %}",
            "<s>",
            "</s>",
        )
        .unwrap();
        let out = template.render(&[Message::user("x")], false).unwrap();
        assert_eq!(out, "<s>[user]x");
    }

    #[test]
    fn test_raise_exception_surfaces_as_template_error() {
        let template = JinjaChatTemplate::new(
            "{% if messages[0].role != 'system' %}{{ raise_exception('system first') }}{% endif %}ok",
            "",
            "",
        )
        .unwrap();
        let err = template.render(&[Message::user("x")], true).unwrap_err();
        assert!(matches!(err, EngineError::Template(msg) if msg.contains("system first")));
    }

    #[test]
    fn test_unparseable_template_rejected() {
        assert!(matches!(
            JinjaChatTemplate::new("{% for %}", "", ""),
            Err(EngineError::Template(_))
        ));
    }
}
