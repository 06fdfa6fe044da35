//! Interface de linha de comando do sincronizador baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (sync, work, status,
//! resume, reset, rename-activities) e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Sincroniza o catálogo OpenSesame com a plataforma de aprendizagem.
#[derive(Debug, Parser)]
#[command(name = "opensesame-sync", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: `opensesame.toml`).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Percorre o catálogo remoto e enfileira os cursos novos.
    Sync,

    /// Executa as tarefas em segundo plano cujo horário já chegou.
    Work,

    /// Mostra o estado de cada curso e se a fila está bloqueada.
    Status {
        /// Página a exibir, começando em 1.
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Cursos por página.
        #[arg(long, default_value_t = 25)]
        page_size: usize,
    },

    /// Zera o contador de falhas e reenfileira os cursos parados.
    Resume,

    /// Volta um curso para `retrieved`.
    Reset {
        /// Identificador remoto do curso.
        remote_id: String,
    },

    /// Renomeia todas as atividades conforme o esquema configurado.
    RenameActivities,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_status_paging() {
        let cli = Cli::parse_from(["opensesame-sync", "status", "--page", "3", "--page-size", "10"]);
        match cli.command {
            Command::Status { page, page_size } => {
                assert_eq!(page, 3);
                assert_eq!(page_size, 10);
            }
            _ => panic!("expected Status command"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "opensesame-sync",
            "--config",
            "/etc/opensesame.toml",
            "--verbose",
            "sync",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/opensesame.toml")));
        assert!(matches!(cli.command, Command::Sync));
    }

    #[test]
    fn cli_parses_reset_and_rename() {
        let cli = Cli::parse_from(["opensesame-sync", "reset", "0d7a6f2e"]);
        match cli.command {
            Command::Reset { remote_id } => assert_eq!(remote_id, "0d7a6f2e"),
            _ => panic!("expected Reset command"),
        }

        let cli = Cli::parse_from(["opensesame-sync", "rename-activities"]);
        assert!(matches!(cli.command, Command::RenameActivities));
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
