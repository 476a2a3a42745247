//! The model catalog: one namespace for built-in, user-defined and plugin models.
//!
//! Built-ins are always present and cannot be shadowed. User functions are parsed
//! when they are registered and may call each other; registering a name again
//! replaces the old definition and rebuilds every function that calls it.

use log::debug;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ModelError;
use crate::model::{FitModel, ModelCategory, ModelFunction};
use crate::models::{user::validate_name, BuiltinModel, UserFunction};
use crate::plugin::PluginModel;

/// Registry of the models available to fits.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    user: BTreeMap<String, Arc<UserFunction>>,
    plugins: BTreeMap<String, PluginModel>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and register a user function.
    ///
    /// # Errors
    ///
    /// * `ModelError::NameCollision` if `name` is a built-in, a math function or a plugin
    /// * `ModelError::Parse` on invalid syntax
    /// * `ModelError::UnknownFunction` if the formula calls an unregistered function
    /// * `ModelError::RecursiveDefinition` if the function would call itself,
    ///   directly or through other user functions
    pub fn register_user(&mut self, name: &str, formula: &str) -> Result<Arc<UserFunction>, ModelError> {
        validate_name(name)?;
        if self.plugins.contains_key(name) {
            return Err(ModelError::NameCollision(name.to_string()));
        }

        let function = UserFunction::with_functions(name, formula, |call| self.user.get(call).cloned())?;
        for call in function.calls() {
            if let Some(chain) = self.path_to(&call, name, &mut Vec::new()) {
                return Err(ModelError::RecursiveDefinition {
                    name: name.to_string(),
                    chain: format!("{} -> {}", name, chain.join(" -> ")),
                });
            }
        }

        let function = Arc::new(function);
        let replaced = self.user.insert(name.to_string(), Arc::clone(&function)).is_some();
        if replaced {
            self.rebuild_callers(name)?;
        }
        debug!(
            "Registered user function '{}' with parameters {:?}",
            name,
            function.parameter_names()
        );
        Ok(function)
    }

    /// Register a plugin model under its own name.
    ///
    /// # Errors
    ///
    /// * `ModelError::NameCollision` if a built-in or user function has that name
    pub fn register_plugin(&mut self, model: PluginModel) -> Result<(), ModelError> {
        let name = model.name();
        if BuiltinModel::is_builtin_name(&name) || self.user.contains_key(&name) {
            return Err(ModelError::NameCollision(name));
        }
        self.plugins.insert(name, model);
        Ok(())
    }

    /// Load a plugin library and register it.
    #[cfg(feature = "plugins")]
    pub fn load_plugin(&mut self, path: impl AsRef<std::path::Path>) -> Result<PluginModel, ModelError> {
        let model = crate::plugin::load_plugin(path)?;
        self.register_plugin(model.clone())?;
        Ok(model)
    }

    /// Resolve a model name: built-ins first, then user functions, then plugins.
    ///
    /// # Errors
    ///
    /// * `ModelError::UnknownModel` if nothing has that name
    pub fn resolve(&self, name: &str) -> Result<FitModel, ModelError> {
        if let Ok(model) = BuiltinModel::from_name(name) {
            return Ok(FitModel::BuiltIn(model));
        }
        if let Some(function) = self.user.get(name) {
            return Ok(FitModel::UserDefined(function.as_ref().clone()));
        }
        if let Some(plugin) = self.plugins.get(name) {
            return Ok(FitModel::Plugin(plugin.clone()));
        }
        Err(ModelError::UnknownModel(name.to_string()))
    }

    pub fn user_function(&self, name: &str) -> Option<Arc<UserFunction>> {
        self.user.get(name).cloned()
    }

    /// Every model name with its category; built-ins are listed one per family.
    pub fn entries(&self) -> Vec<(String, ModelCategory)> {
        let builtin = BuiltinModel::catalog()
            .into_iter()
            .map(|m| (m.name(), ModelCategory::BuiltIn));
        let user = self
            .user
            .keys()
            .map(|n| (n.clone(), ModelCategory::UserDefined));
        let plugins = self
            .plugins
            .keys()
            .map(|n| (n.clone(), ModelCategory::Plugin));
        builtin.chain(user).chain(plugins).collect()
    }

    /// Call chain from `from` to `target` through user functions, if any.
    fn path_to(&self, from: &str, target: &str, visiting: &mut Vec<String>) -> Option<Vec<String>> {
        if from == target {
            return Some(vec![from.to_string()]);
        }
        if visiting.iter().any(|v| v == from) {
            return None;
        }
        let function = self.user.get(from)?;
        visiting.push(from.to_string());
        for call in function.calls() {
            if let Some(mut rest) = self.path_to(&call, target, visiting) {
                rest.insert(0, from.to_string());
                return Some(rest);
            }
        }
        visiting.pop();
        None
    }

    /// Re-resolve every function that calls `changed`, directly or transitively.
    fn rebuild_callers(&mut self, changed: &str) -> Result<(), ModelError> {
        let mut pending = vec![changed.to_string()];
        while let Some(name) = pending.pop() {
            let callers: Vec<String> = self
                .user
                .iter()
                .filter(|(_, f)| f.calls().iter().any(|c| *c == name))
                .map(|(n, _)| n.clone())
                .collect();
            for caller in callers {
                let source = self.user[&caller].source().to_string();
                let rebuilt =
                    UserFunction::with_functions(&caller, &source, |call| self.user.get(call).cloned())?;
                self.user.insert(caller.clone(), Arc::new(rebuilt));
                pending.push(caller);
            }
        }
        Ok(())
    }
}
