//! Template expansion
//!
//! Commands and expected streams may contain mustache-style placeholders,
//! expanded right before a command runs:
//!
//! | Placeholder                     | Expands to                                  |
//! |---------------------------------|---------------------------------------------|
//! | `{{name}}`, `{{{name}}}`        | context variable, empty if undefined        |
//! | `{{match "regex"}}`             | a regex island token (see [`crate::matcher`]) |
//! | `{{sh "cmd"}}`                  | trimmed stdout of `cmd`                     |
//! | `{{#sh "cmd"}}input{{/sh}}`     | same, with the expanded block fed as stdin  |
//! | `{{! note }}`, `{{!-- note --}}` | nothing                                    |
//! | `\{{`                           | a literal `{{`                              |
//!
//! Templates are rendered with [`handlebars`], without HTML escaping.
//! Helper arguments are double-quoted string literals or variable names.
//! A failing `{{sh}}` command is not an error: it expands to an empty
//! string and a warning is recorded.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use handlebars::{
    no_escape, Context as HbContext, Handlebars, Helper, HelperDef, HelperResult, JsonRender,
    Output, RenderContext, RenderError, RenderErrorReason, Renderable,
};
use crate::error::TemplateError;
use crate::matcher::RegexRegistry;
use crate::process::ShellCommand;

/// Reserved variable holding the current working directory
pub const WORKING_DIR: &str = "working-dir";

/// Variables available to placeholders
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    vars: BTreeMap<String, String>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn set_working_dir(&mut self, dir: &Path) {
        self.set(WORKING_DIR, dir.to_string_lossy());
    }

    pub fn working_dir(&self) -> Option<&str> {
        self.get(WORKING_DIR)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut context = Context::new();
        for (k, v) in iter {
            context.set(k, v);
        }
        context
    }
}

/// Expands templates against a context, registering regex islands in a
/// caller-owned registry.
pub struct Expander<'a> {
    context: &'a Context,
    registry: &'a mut RegexRegistry,
    warnings: Vec<String>,
}

impl<'a> Expander<'a> {
    pub fn new(context: &'a Context, registry: &'a mut RegexRegistry) -> Self {
        Self {
            context,
            registry,
            warnings: Vec::new(),
        }
    }

    pub fn expand(&mut self, text: &str) -> Result<String, TemplateError> {
        if !text.contains("{{") {
            return Ok(text.to_string());
        }

        let warnings = Mutex::new(Vec::new());
        let rendered = {
            let mut hb = Handlebars::new();
            hb.register_escape_fn(no_escape);
            hb.register_helper("match", Box::new(MatchHelper {
                registry: Mutex::new(&mut *self.registry),
            }));
            hb.register_helper("sh", Box::new(ShHelper {
                working_dir: self.context.working_dir(),
                warnings: &warnings,
            }));
            hb.render_template(text, &self.context.vars)
        };

        self.warnings.extend(warnings.into_inner().unwrap_or_else(|e| e.into_inner()));
        rendered.map_err(|e| TemplateError::new(e.to_string()))
    }

    /// Non-fatal problems met so far, such as failing `{{sh}}` commands
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }
}

/// Expand `text`, discarding warnings.
pub fn expand(text: &str, context: &Context, registry: &mut RegexRegistry) -> Result<String, TemplateError> {
    Expander::new(context, registry).expand(text)
}

// ──────────────────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────────────────

fn helper_error(msg: String) -> RenderError {
    RenderErrorReason::Other(msg).into()
}

/// The single argument of a helper, rendered as text
fn single_arg(name: &str, h: &Helper<'_>) -> Result<String, RenderError> {
    match h.params().as_slice() {
        [arg] => Ok(arg.value().render()),
        args => Err(helper_error(format!(
            "helper `{}` expects exactly one argument, got {}",
            name,
            args.len(),
        ))),
    }
}

/// `{{match "regex"}}`
struct MatchHelper<'a> {
    registry: Mutex<&'a mut RegexRegistry>,
}

impl HelperDef for MatchHelper<'_> {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc HbContext,
        _: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        if h.is_block() {
            return Err(helper_error("helper `match` does not take a block".to_string()));
        }
        let pattern = single_arg("match", h)?;
        let token = self.registry.lock()
            .unwrap_or_else(|e| e.into_inner())
            .register(&pattern);
        out.write(&token)?;
        Ok(())
    }
}

/// `{{sh "cmd"}}` and `{{#sh "cmd"}}stdin{{/sh}}`
struct ShHelper<'a> {
    working_dir: Option<&'a str>,
    warnings: &'a Mutex<Vec<String>>,
}

impl ShHelper<'_> {
    fn run(&self, command: &str, input: String) -> String {
        let mut cmd = ShellCommand::new(command).stdin(input);
        if let Some(dir) = self.working_dir {
            cmd = cmd.current_dir(dir).path_prepend(dir);
        }
        let warning = match cmd.run() {
            Ok(out) if out.exit_code == 0 => return out.stdout.trim().to_string(),
            Ok(out) => format!(
                "{{{{sh}}}} command failed: `{}` exited with {}: {}",
                command, out.exit_code, out.stderr.trim(),
            ),
            Err(e) => format!("{{{{sh}}}} command failed: {}", e),
        };
        self.warnings.lock().unwrap_or_else(|e| e.into_inner()).push(warning);
        String::new()
    }
}

impl HelperDef for ShHelper<'_> {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc HbContext,
        rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let command = single_arg("sh", h)?;
        let input = match h.template() {
            Some(body) => body.renders(r, ctx, rc)?,
            None => String::new(),
        };
        out.write(&self.run(&command, input))?;
        Ok(())
    }
}
