//! 模板生成器
//!
//! 不依赖任何模型服务的确定性实现，用于本地运行和测试。

use async_trait::async_trait;

use super::{GeneratedCode, GenerationContext, GenerationError, Generator};

#[derive(Debug, Default, Clone)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    pub fn new() -> Self {
        Self
    }

    fn component_name(prompt: &str) -> String {
        let name: String = prompt
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .take(3)
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_lowercase(),
                    None => String::new(),
                }
            })
            .collect();
        if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
            format!("Generated{}", name)
        } else {
            name
        }
    }
}

#[async_trait]
impl Generator for TemplateGenerator {
    async fn chat(&self, prompt: &str, ctx: &GenerationContext) -> Result<String, GenerationError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }
        let scope = match &ctx.app_id {
            Some(app_id) => format!(" for app {}", app_id),
            None => String::new(),
        };
        Ok(format!(
            "I received your message{}: \"{}\". I can help you sketch the structure, \
             generate components, and refine the files as we go. \
             Tell me which part you would like to build first.",
            scope, prompt
        ))
    }

    async fn code(
        &self,
        prompt: &str,
        _ctx: &GenerationContext,
    ) -> Result<GeneratedCode, GenerationError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }
        let name = Self::component_name(prompt);
        let code = format!(
            "// File: src/components/{name}.tsx\n\
             export function {name}() {{\n\
             \x20 return <section className=\"{css}\">{title}</section>;\n\
             }}\n\
             \n\
             // File: src/App.tsx\n\
             import {{ {name} }} from './components/{name}';\n\
             \n\
             export default function App() {{\n\
             \x20 return <{name} />;\n\
             }}\n",
            name = name,
            css = name.to_lowercase(),
            title = prompt.replace(['<', '>', '{', '}'], ""),
        );
        Ok(GeneratedCode::from_code(code))
    }
}
