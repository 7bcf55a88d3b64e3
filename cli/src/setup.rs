//! Provider selection and credential entry
//!
//! `/model` lists every provider that can be used right now: the cloud
//! providers always, Ollama when the server answers with at least one model,
//! and local GGUF when the models directory holds a file.

use std::path::PathBuf;

use mark_core::backend::{discover_gguf_models, OllamaProvider, GEMINI_MODELS, GROQ_MODELS};
use mark_core::{
    create_provider, Conductor, CredentialStore, DisplaySink, MarkConfig, NotifyLevel, Provider,
    ProviderKind, UserPrompter,
};

/// Shortest credential accepted from the keyboard
const MIN_API_KEY_LEN: usize = 10;

/// A provider the user can pick, with its models
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderChoice {
    /// Provider kind
    pub kind: ProviderKind,
    /// Model ids (file paths for local GGUF)
    pub models: Vec<String>,
}

/// Parse a 1-based menu answer
pub fn parse_choice(input: &str, count: usize) -> Option<usize> {
    let n: usize = input.trim().parse().ok()?;
    (1..=count).contains(&n).then(|| n - 1)
}

/// Whether a typed credential is plausible
pub fn valid_api_key(key: &str) -> bool {
    let key = key.trim();
    key.len() >= MIN_API_KEY_LEN && !key.contains(char::is_whitespace)
}

/// Build the provider named in the configuration
///
/// Returns `None` when a credential is missing or the provider cannot be
/// created; the conductor then reports that no model is selected.
pub fn initial_provider(
    config: &MarkConfig,
    creds: &dyn CredentialStore,
) -> Option<Box<dyn Provider>> {
    let kind = ProviderKind::parse(&config.default_provider);
    let credential = creds.get(kind.config_id());
    if kind.needs_credential() && credential.is_none() {
        tracing::info!(provider = kind.config_id(), "No credential stored");
        return None;
    }
    match create_provider(
        kind.config_id(),
        credential.as_deref(),
        &config.default_model,
        &config.provider_settings(),
    ) {
        Ok(provider) => Some(provider),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to create provider");
            None
        }
    }
}

/// Providers usable right now
pub async fn available_choices(config: &MarkConfig) -> Vec<ProviderChoice> {
    let mut choices = vec![
        ProviderChoice {
            kind: ProviderKind::Gemini,
            models: GEMINI_MODELS.iter().map(ToString::to_string).collect(),
        },
        ProviderChoice {
            kind: ProviderKind::Groq,
            models: GROQ_MODELS.iter().map(ToString::to_string).collect(),
        },
    ];

    let ollama = OllamaProvider::new(config.ollama.clone(), ProviderKind::Ollama.default_model());
    match ollama.list_models().await {
        Ok(models) if !models.is_empty() => choices.push(ProviderChoice {
            kind: ProviderKind::Ollama,
            models: models.into_iter().map(|m| m.name).collect(),
        }),
        Ok(_) => tracing::debug!("Ollama has no models installed"),
        Err(e) => tracing::debug!(error = %e, "Ollama not available"),
    }

    let files = discover_gguf_models(&config.local.models_dir);
    if !files.is_empty() {
        choices.push(ProviderChoice {
            kind: ProviderKind::LocalGguf,
            models: files
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
        });
    }
    choices
}

fn model_label(kind: ProviderKind, model: &str) -> String {
    if kind == ProviderKind::LocalGguf {
        PathBuf::from(model)
            .file_name()
            .map_or_else(|| model.to_string(), |n| n.to_string_lossy().into_owned())
    } else {
        model.to_string()
    }
}

fn menu(title: &str, items: impl Iterator<Item = String>) -> String {
    let mut text = title.to_string();
    for (i, item) in items.enumerate() {
        text.push_str(&format!("\n  {}. {item}", i + 1));
    }
    text
}

/// Ask for and store a credential
///
/// Returns the credential, or `None` when the input was rejected.
pub async fn ask_credential(
    kind: ProviderKind,
    sink: &mut dyn DisplaySink,
    prompter: &mut dyn UserPrompter,
    creds: &dyn CredentialStore,
) -> Option<String> {
    let key = prompter
        .ask(&format!("API key for {}: ", kind.label()))
        .await;
    if !valid_api_key(&key) {
        sink.show_system("Invalid API key. Aborting.", NotifyLevel::Error);
        return None;
    }
    if let Err(e) = creds.set(kind.config_id(), &key) {
        tracing::warn!(error = %e, "Failed to save credential");
        sink.show_system(
            &format!("Key not saved ({e}); it will be used for this session only."),
            NotifyLevel::Warning,
        );
    }
    Some(key)
}

/// Interactive provider and model selection
pub async fn select_model(
    conductor: &mut Conductor,
    sink: &mut dyn DisplaySink,
    prompter: &mut dyn UserPrompter,
    creds: &dyn CredentialStore,
) {
    let choices = available_choices(conductor.config()).await;
    sink.show_system(
        &menu("Providers:", choices.iter().map(|c| c.kind.label().to_string())),
        NotifyLevel::Info,
    );
    let answer = prompter
        .ask(&format!("Provider [1-{}]: ", choices.len()))
        .await;
    let Some(choice) = parse_choice(&answer, choices.len()).map(|i| &choices[i]) else {
        sink.show_system("Selection cancelled.", NotifyLevel::Warning);
        return;
    };
    let kind = choice.kind;

    let mut credential = creds.get(kind.config_id());
    if kind.needs_credential() && credential.is_none() {
        credential = ask_credential(kind, sink, prompter, creds).await;
        if credential.is_none() {
            return;
        }
    }

    sink.show_system(
        &menu(
            &format!("{} models:", kind.label()),
            choice.models.iter().map(|m| model_label(kind, m)),
        ),
        NotifyLevel::Info,
    );
    let answer = prompter
        .ask(&format!("Model [1-{}]: ", choice.models.len()))
        .await;
    let Some(model) = parse_choice(&answer, choice.models.len()).map(|i| &choice.models[i]) else {
        sink.show_system("Selection cancelled.", NotifyLevel::Warning);
        return;
    };

    // A GGUF file is loaded per provider, so a new file means a new provider
    let same_provider = kind != ProviderKind::LocalGguf
        && conductor.provider().is_some()
        && ProviderKind::parse(&conductor.config().default_provider) == kind;
    if same_provider {
        if conductor.select_model(model) {
            sink.show_system(
                &format!("Model set to {}", model_label(kind, model)),
                NotifyLevel::Success,
            );
        } else {
            sink.show_system(&format!("Model {model} is not available."), NotifyLevel::Error);
        }
        return;
    }

    let settings = conductor.config().provider_settings();
    let mut provider =
        match create_provider(kind.config_id(), credential.as_deref(), model, &settings) {
            Ok(provider) => provider,
            Err(e) => {
                sink.show_error(&e.to_string(), e.suggestion().as_deref());
                return;
            }
        };

    if kind.needs_credential() && !provider.validate_api_key().await {
        sink.show_system(
            &format!("The stored {} key was rejected.", kind.label()),
            NotifyLevel::Error,
        );
        let Some(key) = ask_credential(kind, sink, prompter, creds).await else {
            return;
        };
        provider = match create_provider(kind.config_id(), Some(&key), model, &settings) {
            Ok(provider) => provider,
            Err(e) => {
                sink.show_error(&e.to_string(), e.suggestion().as_deref());
                return;
            }
        };
        if !provider.validate_api_key().await {
            sink.show_system("Invalid API key. Aborting.", NotifyLevel::Error);
            return;
        }
    }

    let label = model_label(kind, provider.model());
    conductor.switch_provider(provider, kind.config_id());
    sink.show_system(
        &format!("Switched to {} · {label}", kind.label()),
        NotifyLevel::Success,
    );
}

/// Replace a credential the provider rejected and rebuild the provider
pub async fn reenter_credential(
    conductor: &mut Conductor,
    sink: &mut dyn DisplaySink,
    prompter: &mut dyn UserPrompter,
    creds: &dyn CredentialStore,
) {
    let kind = ProviderKind::parse(&conductor.config().default_provider);
    if !kind.needs_credential() {
        return;
    }
    let Some(key) = ask_credential(kind, sink, prompter, creds).await else {
        return;
    };
    let model = conductor.config().default_model.clone();
    match create_provider(
        kind.config_id(),
        Some(&key),
        &model,
        &conductor.config().provider_settings(),
    ) {
        Ok(provider) => {
            conductor.switch_provider(provider, kind.config_id());
            sink.show_system("Key updated. Send your message again.", NotifyLevel::Success);
        }
        Err(e) => sink.show_error(&e.to_string(), e.suggestion().as_deref()),
    }
}
