//! The catalog: tools, resources, resource templates, prompts, roots, and
//! completion providers.
//!
//! Registration order is preserved and is the pagination order for every
//! list method. Static resource URIs are unique; templates are tried in
//! registration order, and a URI matched by a static resource is never
//! dispatched to a template.

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use picomcp_core::RetryOutcome;
use picomcp_protocol::types::prompts::{Prompt, PromptArgument, PromptMessage};
use picomcp_protocol::types::resources::{Resource, ResourceTemplate};
use picomcp_protocol::types::roots::Root;
use picomcp_protocol::types::tasks::TaskSupport;
use picomcp_protocol::types::tools::{Tool, ToolAnnotations, ToolExecution};
use picomcp_protocol::McpError;

use crate::error::ServerResult;
use crate::tasks::TaskEngine;

/// Synchronous tool handler: JSON arguments in, three-valued outcome out.
pub type ToolHandler = Arc<dyn Fn(&Value) -> RetryOutcome + Send + Sync>;

/// Task handler: `(task_id, arguments, engine)`. The handler eventually
/// calls `engine.complete_task` or `engine.fail_task`.
pub type TaskToolHandler = Arc<dyn Fn(&str, &Value, &TaskEngine) + Send + Sync>;

/// Producer of a static resource's content.
pub type ResourceProducer = Arc<dyn Fn() -> String + Send + Sync>;

/// Producer of a templated resource's content, given variable bindings.
pub type TemplateProducer = Arc<dyn Fn(&HashMap<String, String>) -> String + Send + Sync>;

/// Prompt renderer: argument bindings to an ordered message list.
pub type PromptRenderer = Arc<dyn Fn(&HashMap<String, String>) -> Vec<PromptMessage> + Send + Sync>;

/// Completion provider: `(argument_name, partial_value)` to candidates.
pub type CompletionProvider = Arc<dyn Fn(&str, &str) -> Vec<String> + Send + Sync>;

/// Hook run before tool execution; an `Err` short-circuits the call.
pub type BeforeHook = Arc<dyn Fn(&str, &Value) -> Result<(), String> + Send + Sync>;

/// Hook run after the tool-call pipeline with the success flag.
pub type AfterHook = Arc<dyn Fn(&str, bool) + Send + Sync>;

/// Builder for a tool registration.
pub struct ToolDef {
    name: String,
    description: String,
    input_schema: Value,
    output_schema: Option<Value>,
    annotations: Option<ToolAnnotations>,
    task_support: TaskSupport,
    handler: Option<ToolHandler>,
    task_handler: Option<TaskToolHandler>,
    resource_key: Option<String>,
    watchdog: Option<String>,
}

impl std::fmt::Debug for ToolDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDef")
            .field("name", &self.name)
            .field("task_support", &self.task_support)
            .finish()
    }
}

impl ToolDef {
    /// Start a definition with an empty-object input schema.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({"type": "object"}),
            output_schema: None,
            annotations: None,
            task_support: TaskSupport::Forbidden,
            handler: None,
            task_handler: None,
            resource_key: None,
            watchdog: None,
        }
    }

    /// Set the input schema from JSON text. Malformed text keeps the
    /// empty-object default.
    pub fn input_schema(mut self, schema: &str) -> Self {
        if let Ok(value) = serde_json::from_str(schema) {
            self.input_schema = value;
        }
        self
    }

    /// Set the input schema from a parsed value.
    pub fn input_schema_value(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Set the output schema from JSON text.
    pub fn output_schema(mut self, schema: &str) -> Self {
        if let Ok(value) = serde_json::from_str(schema) {
            self.output_schema = Some(value);
        }
        self
    }

    /// Attach behavior annotations.
    pub fn annotations(mut self, annotations: ToolAnnotations) -> Self {
        self.annotations = Some(annotations);
        self
    }

    /// Set the task-support level.
    pub fn task_support(mut self, support: TaskSupport) -> Self {
        self.task_support = support;
        self
    }

    /// Attach the synchronous handler.
    pub fn handler(mut self, handler: impl Fn(&Value) -> RetryOutcome + Send + Sync + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Attach the task handler.
    pub fn task_handler(
        mut self,
        handler: impl Fn(&str, &Value, &TaskEngine) + Send + Sync + 'static,
    ) -> Self {
        self.task_handler = Some(Arc::new(handler));
        self
    }

    /// Name the resource key used by the circuit breaker and retry
    /// registries for this tool.
    pub fn resource_key(mut self, key: impl Into<String>) -> Self {
        self.resource_key = Some(key.into());
        self
    }

    /// Name the watchdog entry kicked on every call of this tool.
    pub fn watchdog(mut self, name: impl Into<String>) -> Self {
        self.watchdog = Some(name.into());
        self
    }
}

/// A registered tool.
#[derive(Clone)]
pub struct ToolEntry {
    /// Wire definition advertised in tools/list.
    pub tool: Tool,
    /// Parsed input schema.
    pub input_schema: Value,
    /// Parsed output schema.
    pub output_schema: Option<Value>,
    /// Task-support level.
    pub task_support: TaskSupport,
    /// Synchronous handler.
    pub handler: Option<ToolHandler>,
    /// Task handler.
    pub task_handler: Option<TaskToolHandler>,
    /// Resource key for the reliability registries.
    pub resource_key: Option<String>,
    /// Watchdog entry name.
    pub watchdog: Option<String>,
    /// Opaque per-tool state slot.
    pub state: Arc<Mutex<Value>>,
}

impl std::fmt::Debug for ToolEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolEntry")
            .field("name", &self.tool.name)
            .field("task_support", &self.task_support)
            .finish()
    }
}

/// Builder for a static resource registration.
pub struct ResourceDef {
    uri: String,
    name: String,
    description: Option<String>,
    mime_type: Option<String>,
    producer: ResourceProducer,
}

impl std::fmt::Debug for ResourceDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceDef").field("uri", &self.uri).finish()
    }
}

impl ResourceDef {
    /// Define a resource with a content producer.
    pub fn new(
        uri: impl Into<String>,
        name: impl Into<String>,
        producer: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: None,
            mime_type: None,
            producer: Arc::new(producer),
        }
    }

    /// Attach a description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach a MIME type.
    pub fn mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }
}

/// Builder for a resource-template registration.
pub struct TemplateDef {
    uri_template: String,
    name: String,
    description: Option<String>,
    mime_type: Option<String>,
    producer: TemplateProducer,
}

impl std::fmt::Debug for TemplateDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateDef")
            .field("uri_template", &self.uri_template)
            .finish()
    }
}

impl TemplateDef {
    /// Define a template with `{var}` placeholders and a producer that
    /// receives the bound variables.
    pub fn new(
        uri_template: impl Into<String>,
        name: impl Into<String>,
        producer: impl Fn(&HashMap<String, String>) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            uri_template: uri_template.into(),
            name: name.into(),
            description: None,
            mime_type: None,
            producer: Arc::new(producer),
        }
    }

    /// Attach a description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach a MIME type.
    pub fn mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }
}

/// Builder for a prompt registration.
pub struct PromptDef {
    name: String,
    description: Option<String>,
    arguments: Vec<PromptArgument>,
    renderer: PromptRenderer,
}

impl std::fmt::Debug for PromptDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptDef").field("name", &self.name).finish()
    }
}

impl PromptDef {
    /// Define a prompt with a renderer.
    pub fn new(
        name: impl Into<String>,
        renderer: impl Fn(&HashMap<String, String>) -> Vec<PromptMessage> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            arguments: Vec::new(),
            renderer: Arc::new(renderer),
        }
    }

    /// Attach a description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Append an argument descriptor.
    pub fn argument(mut self, name: &str, description: &str, required: bool) -> Self {
        self.arguments.push(PromptArgument {
            name: name.to_string(),
            description: if description.is_empty() {
                None
            } else {
                Some(description.to_string())
            },
            required: Some(required),
        });
        self
    }
}

struct ResourceEntry {
    resource: Resource,
    producer: ResourceProducer,
}

struct TemplateEntry {
    template: ResourceTemplate,
    producer: TemplateProducer,
}

struct PromptEntry {
    prompt: Prompt,
    renderer: PromptRenderer,
}

#[derive(Default)]
struct CatalogInner {
    tools: Vec<ToolEntry>,
    resources: Vec<ResourceEntry>,
    templates: Vec<TemplateEntry>,
    prompts: Vec<PromptEntry>,
    roots: Vec<Root>,
    completions: HashMap<String, CompletionProvider>,
}

/// The server catalog.
#[derive(Default)]
pub struct Registry {
    inner: RwLock<CatalogInner>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Registry")
            .field("tools", &inner.tools.len())
            .field("resources", &inner.resources.len())
            .field("templates", &inner.templates.len())
            .field("prompts", &inner.prompts.len())
            .field("roots", &inner.roots.len())
            .finish()
    }
}

/// Match a candidate URI against a `{var}` template. Literal spans must
/// match exactly; each variable binds one or more characters up to the
/// next literal span.
pub fn match_template(template: &str, uri: &str) -> Option<HashMap<String, String>> {
    #[derive(Debug)]
    enum Token {
        Literal(String),
        Var(String),
    }

    let mut tokens = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let close = rest[open..].find('}')? + open;
        if open > 0 {
            tokens.push(Token::Literal(rest[..open].to_string()));
        }
        tokens.push(Token::Var(rest[open + 1..close].to_string()));
        rest = &rest[close + 1..];
    }
    if !rest.is_empty() {
        tokens.push(Token::Literal(rest.to_string()));
    }

    let mut bindings = HashMap::new();
    let mut cursor = uri;
    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i] {
            Token::Literal(lit) => {
                cursor = cursor.strip_prefix(lit.as_str())?;
            }
            Token::Var(name) => {
                // The variable ends where the next literal begins, or at
                // the end of the URI for a trailing variable.
                let value_end = match tokens.get(i + 1) {
                    Some(Token::Literal(next)) => cursor.find(next.as_str())?,
                    _ => cursor.len(),
                };
                if value_end == 0 {
                    return None;
                }
                bindings.insert(name.clone(), cursor[..value_end].to_string());
                cursor = &cursor[value_end..];
            }
        }
        i += 1;
    }

    if cursor.is_empty() {
        Some(bindings)
    } else {
        None
    }
}

impl Registry {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    // ── Tools ──────────────────────────────────────────────────────────

    /// Register a tool. Fails on a duplicate name, when no handler is
    /// attached, or when `required` task support lacks a task handler.
    pub fn add_tool(&self, def: ToolDef) -> ServerResult<()> {
        if def.handler.is_none() && def.task_handler.is_none() {
            return Err(McpError::internal(format!(
                "Registry error: tool '{}' has no handler",
                def.name
            )));
        }
        if def.task_support == TaskSupport::Required && def.task_handler.is_none() {
            return Err(McpError::internal(format!(
                "Registry error: tool '{}' requires tasks but has no task handler",
                def.name
            )));
        }

        let mut inner = self.inner.write();
        if inner.tools.iter().any(|t| t.tool.name == def.name) {
            return Err(McpError::internal(format!(
                "Registry error: tool '{}' already registered",
                def.name
            )));
        }

        let execution = match def.task_support {
            TaskSupport::Forbidden => None,
            support => Some(ToolExecution {
                task_support: support.as_str().to_string(),
            }),
        };

        let tool = Tool {
            name: def.name.clone(),
            description: Some(def.description.clone()),
            input_schema: def.input_schema.clone(),
            output_schema: def.output_schema.clone(),
            annotations: def.annotations.clone(),
            execution,
        };

        inner.tools.push(ToolEntry {
            tool,
            input_schema: def.input_schema,
            output_schema: def.output_schema,
            task_support: def.task_support,
            handler: def.handler,
            task_handler: def.task_handler,
            resource_key: def.resource_key,
            watchdog: def.watchdog,
            state: Arc::new(Mutex::new(Value::Null)),
        });
        Ok(())
    }

    /// Remove a tool by name.
    pub fn remove_tool(&self, name: &str) -> bool {
        let mut inner = self.inner.write();
        let before = inner.tools.len();
        inner.tools.retain(|t| t.tool.name != name);
        inner.tools.len() != before
    }

    /// Look up a tool entry by name.
    pub fn get_tool(&self, name: &str) -> Option<ToolEntry> {
        self.inner
            .read()
            .tools
            .iter()
            .find(|t| t.tool.name == name)
            .cloned()
    }

    /// The per-tool opaque state slot.
    pub fn tool_state(&self, name: &str) -> Option<Arc<Mutex<Value>>> {
        self.inner
            .read()
            .tools
            .iter()
            .find(|t| t.tool.name == name)
            .map(|t| t.state.clone())
    }

    /// Wire definitions of every tool, in registration order.
    pub fn tools_wire(&self) -> Vec<Tool> {
        self.inner.read().tools.iter().map(|t| t.tool.clone()).collect()
    }

    /// Names of every tool, in registration order.
    pub fn tool_names(&self) -> Vec<String> {
        self.inner
            .read()
            .tools
            .iter()
            .map(|t| t.tool.name.clone())
            .collect()
    }

    // ── Resources & templates ──────────────────────────────────────────

    /// Register a static resource. Fails on a duplicate URI.
    pub fn add_resource(&self, def: ResourceDef) -> ServerResult<()> {
        let mut inner = self.inner.write();
        if inner.resources.iter().any(|r| r.resource.uri == def.uri) {
            return Err(McpError::internal(format!(
                "Registry error: resource '{}' already registered",
                def.uri
            )));
        }
        inner.resources.push(ResourceEntry {
            resource: Resource {
                uri: def.uri,
                name: def.name,
                description: def.description,
                mime_type: def.mime_type,
            },
            producer: def.producer,
        });
        Ok(())
    }

    /// Remove a static resource by URI.
    pub fn remove_resource(&self, uri: &str) -> bool {
        let mut inner = self.inner.write();
        let before = inner.resources.len();
        inner.resources.retain(|r| r.resource.uri != uri);
        inner.resources.len() != before
    }

    /// Register a resource template.
    pub fn add_template(&self, def: TemplateDef) {
        self.inner.write().templates.push(TemplateEntry {
            template: ResourceTemplate {
                uri_template: def.uri_template,
                name: def.name,
                description: def.description,
                mime_type: def.mime_type,
            },
            producer: def.producer,
        });
    }

    /// Wire definitions of every resource, in registration order.
    pub fn resources_wire(&self) -> Vec<Resource> {
        self.inner
            .read()
            .resources
            .iter()
            .map(|r| r.resource.clone())
            .collect()
    }

    /// Wire definitions of every template, in registration order.
    pub fn templates_wire(&self) -> Vec<ResourceTemplate> {
        self.inner
            .read()
            .templates
            .iter()
            .map(|t| t.template.clone())
            .collect()
    }

    /// Resolve a URI: static resources first, then templates in
    /// registration order. Returns the produced content and MIME type.
    /// Producers run outside the catalog lock.
    pub fn read_resource(&self, uri: &str) -> Option<(String, Option<String>)> {
        enum Resolved {
            Static(ResourceProducer, Option<String>),
            Templated(TemplateProducer, HashMap<String, String>, Option<String>),
        }

        let resolved = {
            let inner = self.inner.read();
            if let Some(entry) = inner.resources.iter().find(|r| r.resource.uri == uri) {
                Some(Resolved::Static(
                    entry.producer.clone(),
                    entry.resource.mime_type.clone(),
                ))
            } else {
                inner.templates.iter().find_map(|entry| {
                    match_template(&entry.template.uri_template, uri).map(|bindings| {
                        Resolved::Templated(
                            entry.producer.clone(),
                            bindings,
                            entry.template.mime_type.clone(),
                        )
                    })
                })
            }
        };

        match resolved? {
            Resolved::Static(producer, mime) => Some((producer(), mime)),
            Resolved::Templated(producer, bindings, mime) => Some((producer(&bindings), mime)),
        }
    }

    /// True when a static resource or template matches the URI.
    pub fn resource_exists(&self, uri: &str) -> bool {
        let inner = self.inner.read();
        inner.resources.iter().any(|r| r.resource.uri == uri)
            || inner
                .templates
                .iter()
                .any(|t| match_template(&t.template.uri_template, uri).is_some())
    }

    // ── Prompts ────────────────────────────────────────────────────────

    /// Register a prompt. Fails on a duplicate name.
    pub fn add_prompt(&self, def: PromptDef) -> ServerResult<()> {
        let mut inner = self.inner.write();
        if inner.prompts.iter().any(|p| p.prompt.name == def.name) {
            return Err(McpError::internal(format!(
                "Registry error: prompt '{}' already registered",
                def.name
            )));
        }
        inner.prompts.push(PromptEntry {
            prompt: Prompt {
                name: def.name,
                description: def.description,
                arguments: if def.arguments.is_empty() {
                    None
                } else {
                    Some(def.arguments)
                },
            },
            renderer: def.renderer,
        });
        Ok(())
    }

    /// Wire definitions of every prompt, in registration order.
    pub fn prompts_wire(&self) -> Vec<Prompt> {
        self.inner
            .read()
            .prompts
            .iter()
            .map(|p| p.prompt.clone())
            .collect()
    }

    /// Render a prompt with argument bindings. Missing required arguments
    /// are reported by name.
    pub fn render_prompt(
        &self,
        name: &str,
        args: &HashMap<String, String>,
    ) -> ServerResult<(Option<String>, Vec<PromptMessage>)> {
        let inner = self.inner.read();
        let entry = inner
            .prompts
            .iter()
            .find(|p| p.prompt.name == name)
            .ok_or_else(|| McpError::invalid_params(format!("Unknown prompt: {name}")))?;

        if let Some(arguments) = &entry.prompt.arguments {
            for arg in arguments {
                if arg.required.unwrap_or(false) && !args.contains_key(&arg.name) {
                    return Err(McpError::invalid_params(format!(
                        "Missing required argument: {}",
                        arg.name
                    )));
                }
            }
        }

        let description = entry.prompt.description.clone();
        let renderer = entry.renderer.clone();
        drop(inner);
        Ok((description, renderer(args)))
    }

    // ── Roots ──────────────────────────────────────────────────────────

    /// Register a root.
    pub fn add_root(&self, uri: impl Into<String>, name: Option<String>) {
        self.inner.write().roots.push(Root {
            uri: uri.into(),
            name,
        });
    }

    /// Every root, in registration order.
    pub fn roots_wire(&self) -> Vec<Root> {
        self.inner.read().roots.clone()
    }

    // ── Completion providers ───────────────────────────────────────────

    /// Register a completion provider for a prompt argument.
    pub fn add_prompt_completion(
        &self,
        prompt: &str,
        argument: &str,
        provider: impl Fn(&str, &str) -> Vec<String> + Send + Sync + 'static,
    ) {
        let key = format!("prompt:{prompt}:{argument}");
        self.inner.write().completions.insert(key, Arc::new(provider));
    }

    /// Register a completion provider for a resource-template variable.
    pub fn add_template_completion(
        &self,
        uri_template: &str,
        variable: &str,
        provider: impl Fn(&str, &str) -> Vec<String> + Send + Sync + 'static,
    ) {
        let key = format!("template:{uri_template}:{variable}");
        self.inner.write().completions.insert(key, Arc::new(provider));
    }

    /// Run the provider registered under `key`, prefix-filter by
    /// `partial`, and truncate to `max_results`. Returns the values and a
    /// more-available flag; an unknown key yields an empty result.
    pub fn complete(
        &self,
        key: &str,
        argument: &str,
        partial: &str,
        max_results: usize,
    ) -> (Vec<String>, bool) {
        let provider = match self.inner.read().completions.get(key) {
            Some(provider) => provider.clone(),
            None => return (Vec::new(), false),
        };
        let mut filtered: Vec<String> = provider(argument, partial)
            .into_iter()
            .filter(|candidate| partial.is_empty() || candidate.starts_with(partial))
            .collect();
        let has_more = filtered.len() > max_results;
        filtered.truncate(max_results);
        (filtered, has_more)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use picomcp_protocol::types::content::Content;
    use picomcp_protocol::types::prompts::Role;

    fn noop_tool(name: &str) -> ToolDef {
        ToolDef::new(name, "test tool").handler(|_| RetryOutcome::success("ok"))
    }

    #[test]
    fn tool_registration_preserves_order() {
        let registry = Registry::new();
        registry.add_tool(noop_tool("b_tool")).unwrap();
        registry.add_tool(noop_tool("a_tool")).unwrap();
        registry.add_tool(noop_tool("c_tool")).unwrap();
        assert_eq!(registry.tool_names(), vec!["b_tool", "a_tool", "c_tool"]);
    }

    #[test]
    fn duplicate_tool_rejected() {
        let registry = Registry::new();
        registry.add_tool(noop_tool("t")).unwrap();
        assert!(registry.add_tool(noop_tool("t")).is_err());
    }

    #[test]
    fn tool_without_handler_rejected() {
        let registry = Registry::new();
        let def = ToolDef::new("bare", "no handlers");
        assert!(registry.add_tool(def).is_err());
    }

    #[test]
    fn required_task_support_needs_task_handler() {
        let registry = Registry::new();
        let def = ToolDef::new("t", "d")
            .task_support(TaskSupport::Required)
            .handler(|_| RetryOutcome::success("ok"));
        assert!(registry.add_tool(def).is_err());

        let def = ToolDef::new("t", "d")
            .task_support(TaskSupport::Required)
            .task_handler(|_, _, _| {});
        assert!(registry.add_tool(def).is_ok());
    }

    #[test]
    fn remove_tool() {
        let registry = Registry::new();
        registry.add_tool(noop_tool("t")).unwrap();
        assert!(registry.remove_tool("t"));
        assert!(!registry.remove_tool("t"));
        assert!(registry.get_tool("t").is_none());
    }

    #[test]
    fn tool_state_slot_is_per_tool() {
        let registry = Registry::new();
        registry.add_tool(noop_tool("t")).unwrap();
        let slot = registry.tool_state("t").unwrap();
        *slot.lock() = serde_json::json!({"irq_count": 3});
        let again = registry.tool_state("t").unwrap();
        assert_eq!(again.lock()["irq_count"], 3);
    }

    #[test]
    fn template_matching_binds_variables() {
        let bindings = match_template("sensor://{bus}/{id}", "sensor://i2c/0x48").unwrap();
        assert_eq!(bindings["bus"], "i2c");
        assert_eq!(bindings["id"], "0x48");
    }

    #[test]
    fn template_matching_rejects_mismatches() {
        assert!(match_template("sensor://{bus}/{id}", "sensor://i2c").is_none());
        assert!(match_template("sensor://{bus}", "actuator://x").is_none());
        assert!(match_template("sensor://{bus}/", "sensor:///").is_none()); // empty var
    }

    #[test]
    fn template_trailing_variable_consumes_rest() {
        let bindings = match_template("log://{file}", "log://boot/current.txt").unwrap();
        assert_eq!(bindings["file"], "boot/current.txt");
    }

    #[test]
    fn static_resource_wins_over_template() {
        let registry = Registry::new();
        registry.add_template(TemplateDef::new("dev://{name}", "any device", |vars| {
            format!("template:{}", vars["name"])
        }));
        registry
            .add_resource(ResourceDef::new("dev://lcd", "the lcd", || {
                "static:lcd".to_string()
            }))
            .unwrap();

        let (content, _) = registry.read_resource("dev://lcd").unwrap();
        assert_eq!(content, "static:lcd");
        let (content, _) = registry.read_resource("dev://uart").unwrap();
        assert_eq!(content, "template:uart");
        assert!(registry.read_resource("other://x").is_none());
    }

    #[test]
    fn templates_tried_in_registration_order() {
        let registry = Registry::new();
        registry.add_template(TemplateDef::new("a://{x}", "first", |_| "first".into()));
        registry.add_template(TemplateDef::new("a://{y}", "second", |_| "second".into()));
        let (content, _) = registry.read_resource("a://anything").unwrap();
        assert_eq!(content, "first");
    }

    #[test]
    fn duplicate_resource_uri_rejected() {
        let registry = Registry::new();
        registry
            .add_resource(ResourceDef::new("r://a", "a", || String::new()))
            .unwrap();
        assert!(registry
            .add_resource(ResourceDef::new("r://a", "dup", || String::new()))
            .is_err());
    }

    #[test]
    fn prompt_render_and_required_args() {
        let registry = Registry::new();
        registry
            .add_prompt(
                PromptDef::new("diagnose", |args| {
                    vec![PromptMessage {
                        role: Role::User,
                        content: Content::text(format!(
                            "diagnose sensor {}",
                            args.get("sensor").cloned().unwrap_or_default()
                        )),
                    }]
                })
                .description("diagnose a sensor")
                .argument("sensor", "which sensor", true),
            )
            .unwrap();

        let err = registry.render_prompt("diagnose", &HashMap::new()).unwrap_err();
        assert!(err.message.contains("sensor"));

        let mut args = HashMap::new();
        args.insert("sensor".to_string(), "bme280".to_string());
        let (description, messages) = registry.render_prompt("diagnose", &args).unwrap();
        assert_eq!(description.as_deref(), Some("diagnose a sensor"));
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn completion_prefix_filter_and_truncation() {
        let registry = Registry::new();
        registry.add_prompt_completion("diagnose", "sensor", |_, _| {
            vec![
                "bme280".to_string(),
                "bmp180".to_string(),
                "dht22".to_string(),
            ]
        });

        let (values, more) = registry.complete("prompt:diagnose:sensor", "sensor", "bm", 10);
        assert_eq!(values, vec!["bme280", "bmp180"]);
        assert!(!more);

        let (values, more) = registry.complete("prompt:diagnose:sensor", "sensor", "", 2);
        assert_eq!(values.len(), 2);
        assert!(more);

        let (values, more) = registry.complete("prompt:missing:arg", "arg", "", 10);
        assert!(values.is_empty());
        assert!(!more);
    }
}
