use crate::models::Config;

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(&mut self, message: S, hint: H) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    /// Emits every warning through `tracing`.
    pub fn log(&self) {
        for warning in &self.items {
            match &warning.hint {
                Some(hint) => tracing::warn!(hint = %hint, "{}", warning.message),
                None => tracing::warn!("{}", warning.message),
            }
        }
    }
}

/// Soft checks; none of these stop the server from starting.
pub fn apply_guard_rails(config: &Config) -> ConfigWarnings {
    let mut warnings = ConfigWarnings::default();
    let roots = config.library_roots();

    let missing: Vec<String> = roots
        .all()
        .iter()
        .filter(|root| !root.path.is_dir())
        .map(|root| root.path.display().to_string())
        .collect();
    if missing.len() == roots.all().len() {
        warnings.push_with_hint(
            "None of the configured library directories exist",
            "Set LIBRARY_DIRS to one or more existing directories",
        );
    } else {
        for path in missing {
            warnings.push(format!("Library directory {path} does not exist"));
        }
    }

    for id in &config.library.public {
        if !roots.all().iter().any(|root| root.id == *id) {
            warnings.push(format!(
                "Public library `{id}` does not match any configured library root"
            ));
        }
    }

    if !config.auth.has_tokens() {
        warnings.push_with_hint(
            "API_TOKENS not configured; private library routes will reject every request",
            "Set API_TOKENS to one or more bearer tokens",
        );
    }

    if config.cache.ttl < config.cache.cleanup_interval {
        warnings.push(format!(
            "Cache TTL ({}) is shorter than the cleanup interval ({}); artifacts will outlive their TTL",
            humantime::format_duration(config.cache.ttl),
            humantime::format_duration(config.cache.cleanup_interval),
        ));
    }

    warnings
}
