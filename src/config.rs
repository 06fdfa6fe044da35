//! Configuração do sincronizador carregada a partir de `opensesame.toml`.
//!
//! A struct [`SyncConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `OPENSESAME_*` têm precedência sobre o arquivo.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

use crate::api::{Credentials, RetryPolicy, Timeouts};
use crate::error::SyncError;
use crate::handler::{ActivityNaming, HandlerSettings};
use crate::host::PackageType;

pub const DEFAULT_CONFIG_FILE: &str = "opensesame.toml";

/// Configuração de nível superior carregada de `opensesame.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Endpoint OAuth2 que emite o token de acesso.
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// URL base da API de conteúdo.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    #[serde(default)]
    pub customer_integration_id: String,

    /// Registros por página na listagem.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Tentativas por requisição antes de desistir.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Espera fixa entre tentativas, em milissegundos.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// `local` guarda o pacote no curso; `aiccurl` usa a URL de lançamento.
    #[serde(default)]
    pub package_type: PackageType,

    /// Esquema de nome das atividades.
    #[serde(default)]
    pub activity_naming: ActivityNaming,

    #[serde(default)]
    pub activity_prefix: String,

    /// Categoria do host sob a qual ficam as categorias raiz.
    #[serde(default)]
    pub root_category: Option<u64>,

    /// Falhas consecutivas que bloqueiam a fila.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Atraso até uma tarefa poder rodar, em segundos.
    #[serde(default = "default_task_delay_secs")]
    pub task_delay_secs: u64,

    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,

    /// Arquivo JSON com o estado local do host.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

fn default_auth_url() -> String {
    "https://auth.coursecloud.net/oauth2/aus1l01v8s55riV0C0h8/v1/token".to_string()
}

fn default_base_url() -> String {
    "https://api.delivery.opensesame.com".to_string()
}

fn default_page_size() -> u32 {
    50
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    3000
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_download_timeout_secs() -> u64 {
    320
}

fn default_connect_timeout_secs() -> u64 {
    20
}

fn default_failure_threshold() -> u32 {
    5
}

// Cinco minutos.
fn default_task_delay_secs() -> u64 {
    300
}

fn default_lock_timeout_secs() -> u64 {
    10
}

fn default_state_file() -> PathBuf {
    PathBuf::from("opensesame-state.json")
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auth_url: default_auth_url(),
            base_url: default_base_url(),
            client_id: String::new(),
            client_secret: String::new(),
            customer_integration_id: String::new(),
            page_size: default_page_size(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            download_timeout_secs: default_download_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            package_type: PackageType::default(),
            activity_naming: ActivityNaming::default(),
            activity_prefix: String::new(),
            root_category: None,
            failure_threshold: default_failure_threshold(),
            task_delay_secs: default_task_delay_secs(),
            lock_timeout_secs: default_lock_timeout_secs(),
            state_file: default_state_file(),
        }
    }
}

impl SyncConfig {
    /// Carrega a configuração de `path`, ou de `opensesame.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<SyncConfig>(&contents)?
        } else {
            Self::default()
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Variáveis de ambiente têm precedência sobre o arquivo de configuração.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let overrides: [(&str, &mut String); 5] = [
            ("OPENSESAME_CLIENT_ID", &mut self.client_id),
            ("OPENSESAME_CLIENT_SECRET", &mut self.client_secret),
            (
                "OPENSESAME_CUSTOMER_INTEGRATION_ID",
                &mut self.customer_integration_id,
            ),
            ("OPENSESAME_AUTH_URL", &mut self.auth_url),
            ("OPENSESAME_BASE_URL", &mut self.base_url),
        ];
        for (name, field) in overrides {
            if let Some(value) = lookup(name)
                && !value.is_empty()
            {
                *field = value;
            }
        }
    }

    /// Falha com a lista de todas as configurações obrigatórias ausentes.
    pub fn validate(&self) -> Result<(), SyncError> {
        let required = [
            ("auth_url", &self.auth_url),
            ("base_url", &self.base_url),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("customer_integration_id", &self.customer_integration_id),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SyncError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            customer_integration_id: self.customer_integration_id.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(self.connect_timeout_secs),
            request: Duration::from_secs(self.request_timeout_secs),
            download: Duration::from_secs(self.download_timeout_secs),
        }
    }

    pub fn handler_settings(&self) -> HandlerSettings {
        HandlerSettings {
            package_type: self.package_type,
            activity_naming: self.activity_naming,
            activity_prefix: self.activity_prefix.clone(),
            root_category: self.root_category,
        }
    }

    pub fn task_delay(&self) -> Duration {
        Duration::from_secs(self.task_delay_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = SyncConfig::default();
        assert_eq!(config.page_size, 50);
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.retry_delay_ms, 3000);
        assert_eq!(config.download_timeout_secs, 320);
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.task_delay_secs, 300);
        assert_eq!(config.package_type, PackageType::Local);
        assert_eq!(config.activity_naming, ActivityNaming::RemoteId);
        assert!(config.client_id.is_empty());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            client_id = "client"
            page_size = 10
            package_type = "aiccurl"
            activity_naming = "course_name"
            root_category = 4
        "#;
        let config: SyncConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.client_id, "client");
        assert_eq!(config.page_size, 10);
        assert_eq!(config.package_type, PackageType::AiccUrl);
        assert_eq!(config.activity_naming, ActivityNaming::CourseName);
        assert_eq!(config.root_category, Some(4));
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.base_url, "https://api.delivery.opensesame.com");
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = SyncConfig {
            client_id: "from-file".into(),
            ..SyncConfig::default()
        };
        config.apply_env(|name| match name {
            "OPENSESAME_CLIENT_ID" => Some("from-env".into()),
            "OPENSESAME_CLIENT_SECRET" => Some(String::new()),
            "OPENSESAME_BASE_URL" => Some("http://localhost:9000".into()),
            _ => None,
        });
        assert_eq!(config.client_id, "from-env");
        assert!(config.client_secret.is_empty());
        assert_eq!(config.base_url, "http://localhost:9000");
    }

    #[test]
    fn validate_names_every_missing_setting() {
        let config = SyncConfig {
            client_id: "id".into(),
            ..SyncConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Config error: missing required settings: client_secret, customer_integration_id"
        );

        let config = SyncConfig {
            client_id: "id".into(),
            client_secret: "secret".into(),
            customer_integration_id: "cust".into(),
            ..SyncConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_reads_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "failure_threshold = 2\nstate_file = \"state.json\"\n").unwrap();

        let config = SyncConfig::load(Some(path.as_path())).unwrap();
        assert_eq!(config.failure_threshold, 2);
        assert_eq!(config.state_file, PathBuf::from("state.json"));
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SyncConfig::load(Some(dir.path().join("absent.toml").as_path())).unwrap();
        assert_eq!(config.page_size, 50);
    }
}
