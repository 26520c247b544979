//! The renderer: one minijinja environment per run configuration.

use minijinja::{Environment, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use crate::error::{JinjaError, JinjaResult};
use crate::functions::{
    make_config_fn, make_env_var_fn, make_ref_fn, make_source_fn, make_var_fn, yaml_to_json,
    ConfigCapture, EnvVarCapture, MissingEnvVarCapture, RefCapture, SourceCapture,
};

/// Inputs for constructing a [`JinjaRenderer`].
#[derive(Debug, Default)]
pub struct RendererOptions {
    /// Project vars available through var()
    pub vars: HashMap<String, serde_yaml::Value>,

    /// Explicit environment snapshot read through env_var()
    pub env: BTreeMap<String, String>,

    /// ref name -> resolved relation. None puts the renderer in parse
    /// mode, where ref() echoes the target name.
    pub ref_relations: Option<HashMap<String, String>>,

    /// "source_name.table" -> resolved relation; None in parse mode.
    pub source_relations: Option<HashMap<String, String>>,

    /// Macro definitions prepended to every template before rendering
    pub macro_prelude: String,
}

/// What one render produced and touched.
#[derive(Debug, Clone)]
pub struct Rendered {
    /// Rendered SQL text
    pub sql: String,

    /// ref() targets, in call order
    pub refs: Vec<String>,

    /// source() targets as (source_name, table)
    pub sources: Vec<(String, String)>,

    /// Env var names consumed during the render
    pub env_vars: BTreeSet<String>,

    /// config() values captured during the render
    pub config: HashMap<String, Value>,
}

/// Jinja rendering environment for Wrenflow resources.
pub struct JinjaRenderer<'a> {
    env: Environment<'a>,
    macro_prelude: String,
    refs: RefCapture,
    sources: SourceCapture,
    env_vars: EnvVarCapture,
    missing_env: MissingEnvVarCapture,
    config: ConfigCapture,
}

impl<'a> JinjaRenderer<'a> {
    /// Build a renderer from run-level options.
    pub fn new(opts: RendererOptions) -> Self {
        let mut env = Environment::new();

        let refs: RefCapture = Arc::new(Mutex::new(Vec::new()));
        let sources: SourceCapture = Arc::new(Mutex::new(Vec::new()));
        let env_vars: EnvVarCapture = Arc::new(Mutex::new(BTreeSet::new()));
        let missing_env: MissingEnvVarCapture = Arc::new(Mutex::new(None));
        let config: ConfigCapture = Arc::new(Mutex::new(HashMap::new()));

        let json_vars: HashMap<String, serde_json::Value> = opts
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), yaml_to_json(v)))
            .collect();

        env.add_function("ref", make_ref_fn(refs.clone(), opts.ref_relations));
        env.add_function(
            "source",
            make_source_fn(sources.clone(), opts.source_relations),
        );
        env.add_function(
            "env_var",
            make_env_var_fn(env_vars.clone(), missing_env.clone(), opts.env),
        );
        env.add_function("var", make_var_fn(json_vars));
        env.add_function("config", make_config_fn(config.clone()));

        Self {
            env,
            macro_prelude: opts.macro_prelude,
            refs,
            sources,
            env_vars,
            missing_env,
            config,
        }
    }

    /// Render a resource's raw SQL, returning the text plus everything the
    /// render touched.
    ///
    /// A reference to an unset env var with no default fails the render
    /// with [`JinjaError::UndefinedEnvVar`] naming the variable.
    pub fn render(&self, template: &str) -> JinjaResult<Rendered> {
        self.clear_captures()?;

        let full = if self.macro_prelude.is_empty() {
            template.to_string()
        } else {
            format!("{}\n{}", self.macro_prelude, template)
        };

        let result = self.env.render_str(&full, ());

        let sql = match result {
            Ok(text) => text,
            Err(e) => {
                if let Some(name) = self.take_missing_env()? {
                    return Err(JinjaError::UndefinedEnvVar { name });
                }
                return Err(JinjaError::from(e));
            }
        };

        Ok(Rendered {
            // Macro definitions render to whitespace ahead of the SQL body
            sql: sql.trim_start().to_string(),
            refs: self.lock(&self.refs)?.clone(),
            sources: self.lock(&self.sources)?.clone(),
            env_vars: self.lock(&self.env_vars)?.clone(),
            config: self.lock(&self.config)?.clone(),
        })
    }

    fn clear_captures(&self) -> JinjaResult<()> {
        self.lock(&self.refs)?.clear();
        self.lock(&self.sources)?.clear();
        self.lock(&self.env_vars)?.clear();
        self.lock(&self.config)?.clear();
        *self.lock(&self.missing_env)? = None;
        Ok(())
    }

    fn take_missing_env(&self) -> JinjaResult<Option<String>> {
        Ok(self.lock(&self.missing_env)?.take())
    }

    fn lock<'m, T>(&self, cell: &'m Arc<Mutex<T>>) -> JinjaResult<std::sync::MutexGuard<'m, T>> {
        cell.lock()
            .map_err(|e| JinjaError::Internal(format!("capture mutex poisoned: {}", e)))
    }
}

impl Default for JinjaRenderer<'_> {
    fn default() -> Self {
        Self::new(RendererOptions::default())
    }
}

#[cfg(test)]
#[path = "environment_test.rs"]
mod tests;
