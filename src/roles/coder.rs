//! Coder role: `generate` produces a fresh file body, `patch` produces a
//! fix given a strategy. Both return `(path, content)` via the shared
//! Response Parser so the Coder's output format matches whatever the
//! model actually emitted, not an idealized single format.

use super::prompts::{PromptStore, CODER_PATCH_SYSTEM, CODER_SYSTEM};
use super::ModelBackend;
use crate::config::{Role, Size};
use crate::dag::task::{FixStrategy, TaskNode};
use crate::error::EngineError;
use crate::memory::CoderContext;
use crate::model_client::Message;
use crate::parser::{parse, FileWrite};

pub struct Coder<'a> {
    pub backend: &'a dyn ModelBackend,
    pub prompts: &'a PromptStore,
}

impl<'a> Coder<'a> {
    pub async fn generate(&self, task: &TaskNode, context: &CoderContext, size: Size) -> Result<FileWrite, EngineError> {
        let user = format!(
            "Architecture: {}\nFile to generate: {}\nDescription: {}\nDependencies: {:?}\n",
            context.architecture_summary,
            task.file.display(),
            task.description,
            context.dependencies,
        );
        let messages = vec![Message::system(self.prompts.get(CODER_SYSTEM)), Message::user(user)];
        let raw = self.backend.call(Role::Coder, messages, size).await?;
        first_file_or_err(&raw, &task.file)
    }

    pub async fn patch(
        &self,
        task: &TaskNode,
        current_content: &str,
        strategy: FixStrategy,
        guidance: &str,
        size: Size,
    ) -> Result<FileWrite, EngineError> {
        let user = format!(
            "File: {}\nFix strategy: {:?}\nGuidance: {guidance}\n\nCurrent content:\n{current_content}\n",
            task.file.display(),
            strategy,
        );
        let messages = vec![Message::system(self.prompts.get(CODER_PATCH_SYSTEM)), Message::user(user)];
        let raw = self.backend.call(Role::Coder, messages, size).await?;
        first_file_or_err(&raw, &task.file)
    }
}

fn first_file_or_err(raw: &str, expected_path: &std::path::Path) -> Result<FileWrite, EngineError> {
    let parsed = parse(raw);
    parsed
        .files
        .into_iter()
        .next()
        .map(|mut f| {
            if f.path.as_os_str().is_empty() {
                f.path = expected_path.to_path_buf();
            }
            f
        })
        .ok_or_else(|| EngineError::ParseError("coder produced no file block".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Role as ConfigRole};
    use crate::dag::task::{TaskId, TaskStatus};
    use crate::roles::BoxFuture;
    use std::path::PathBuf;

    struct MockBackend(&'static str);
    impl ModelBackend for MockBackend {
        fn call<'a>(&'a self, _role: ConfigRole, _messages: Vec<Message>, _size: Size) -> BoxFuture<'a, Result<String, EngineError>> {
            Box::pin(async move { Ok(self.0.to_string()) })
        }
    }

    fn sample_task() -> TaskNode {
        let mut t = TaskNode::new(TaskId(1), PathBuf::from("app.py"), "entry".into(), vec![]);
        t.status = TaskStatus::InProgress;
        t
    }

    #[tokio::test]
    async fn generate_extracts_single_file() {
        let backend = MockBackend("===FILE: app.py===\nprint(1)\n===END===\n");
        let prompts = PromptStore::load(None);
        let coder = Coder { backend: &backend, prompts: &prompts };
        let context = CoderContext {
            architecture_summary: "x".into(),
            spec_slots: Default::default(),
            dependencies: vec![],
            related_files: vec![],
        };
        let file = coder.generate(&sample_task(), &context, Size::Small).await.unwrap();
        assert_eq!(file.path, PathBuf::from("app.py"));
        assert_eq!(file.content, "print(1)\n");
    }

    #[tokio::test]
    async fn generate_errors_when_no_file_block() {
        let backend = MockBackend("I refuse to write this file.");
        let prompts = PromptStore::load(None);
        let coder = Coder { backend: &backend, prompts: &prompts };
        let context = CoderContext {
            architecture_summary: "x".into(),
            spec_slots: Default::default(),
            dependencies: vec![],
            related_files: vec![],
        };
        assert!(coder.generate(&sample_task(), &context, Size::Small).await.is_err());
    }
}
