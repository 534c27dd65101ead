//! MCP request and result payload types.

pub mod completion;
pub mod content;
pub mod core;
pub mod elicitation;
pub mod initialization;
pub mod logging;
pub mod progress;
pub mod prompts;
pub mod resources;
pub mod roots;
pub mod sampling;
pub mod tasks;
pub mod tools;

pub use completion::{CompleteRequest, CompleteResult, Completion, CompletionArgument, CompletionReference};
pub use content::{Content, EmbeddedResource, ResourceContents, TextContent};
pub use self::core::{Cursor, Implementation, RequestId};
pub use elicitation::{ElicitAction, ElicitRequest, ElicitResult};
pub use initialization::{
    ClientCapabilities, InitializeRequest, InitializeResult, ServerCapabilities,
};
pub use logging::{LoggingMessageParams, LogLevel, SetLevelRequest};
pub use progress::ProgressParams;
pub use prompts::{
    GetPromptRequest, GetPromptResult, ListPromptsResult, Prompt, PromptArgument, PromptMessage,
    Role,
};
pub use resources::{
    ListResourcesResult, ListResourceTemplatesResult, ReadResourceRequest, ReadResourceResult,
    Resource, ResourceTemplate, SubscribeRequest, UnsubscribeRequest,
};
pub use roots::{ListRootsResult, Root};
pub use sampling::{CreateMessageParams, SamplingMessage};
pub use tasks::{
    CancelTaskRequest, GetTaskRequest, ListTasksResult, Task, TaskMetadata, TaskStatus,
    TaskSupport,
};
pub use tools::{CallToolRequest, CallToolResult, ListToolsResult, Tool, ToolAnnotations};
