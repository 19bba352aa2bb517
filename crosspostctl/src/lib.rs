use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crosspost_core::{
    load_crosspost_config, AuthManager, AuthStatus, BrowserPool, ChromiumLauncher,
    CredentialStore, CrosspostConfig, LaunchOptions, Platform, PublishPipeline, PublishRequest,
    PublishResult,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] crosspost_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Auth(#[from] crosspost_core::AuthError),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Publish videos to multiple platforms through a shared browser session", long_about = None)]
pub struct Cli {
    /// Caminho do crosspost.toml (opcional; defaults aplicam sem arquivo)
    #[arg(long, default_value = "crosspost.toml")]
    pub config: PathBuf,
    /// Diretório override para cookies e logs (substitui paths.base_dir)
    #[arg(long)]
    pub base_dir: Option<PathBuf>,
    /// Formato de saída
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Plataforma alvo (douyin, xiaohongshu, kuaishou, shipinhao)
    pub platform: String,
    #[command(subcommand)]
    pub action: Action,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Action {
    /// Abre a janela de login interativo e persiste a sessão
    Login,
    /// Verifica se a sessão persistida ainda é aceita pela plataforma
    Verify,
    /// Exibe o estado de autenticação da plataforma
    Status,
    /// Publica um vídeo
    Upload(UploadArgs),
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Arquivo de vídeo a publicar
    #[arg(long)]
    pub file: PathBuf,
    /// Título do vídeo (default: nome do arquivo)
    #[arg(long)]
    pub title: Option<String>,
    /// Descrição do vídeo
    #[arg(long)]
    pub content: Option<String>,
    /// Tags separadas por vírgula, aplicadas em ordem
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,
    /// Arquivo texto com título, descrição e #tags
    #[arg(long)]
    pub txt: Option<PathBuf>,
    /// Imagem de capa
    #[arg(long)]
    pub thumbnail: Option<PathBuf>,
    /// Publicação agendada, formato "YYYY-MM-DD HH:MM"
    #[arg(long = "publish-date")]
    pub publish_date: Option<String>,
    /// Desabilita o login automático quando a sessão está inválida
    #[arg(long = "no-auto-login", default_value_t = false)]
    pub no_auto_login: bool,
    /// Força modo headless para a publicação
    #[arg(long, default_value_t = false)]
    pub headless: bool,
}

pub fn run(cli: Cli) -> i32 {
    init_tracing();
    match execute(cli) {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(err) => {
            eprintln!("erro: {err}");
            1
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn execute(cli: Cli) -> Result<bool> {
    let platform = Platform::from_str(&cli.platform)
        .map_err(|err| AppError::InvalidArgument(err.to_string()))?;
    let config = load_config(&cli)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(dispatch(cli, platform, config))
}

fn load_config(cli: &Cli) -> Result<CrosspostConfig> {
    let mut config = if cli.config.exists() {
        load_crosspost_config(&cli.config)?
    } else {
        CrosspostConfig::default()
    };
    if let Some(base_dir) = &cli.base_dir {
        config.paths.base_dir = base_dir.display().to_string();
    }
    Ok(config)
}

async fn dispatch(cli: Cli, platform: Platform, config: CrosspostConfig) -> Result<bool> {
    let context = AppContext::new(config);
    let adapter = platform.adapter();
    let adapter = adapter.as_ref();

    match &cli.action {
        Action::Login => {
            let logged_in = context.auth().interactive_login(adapter).await?;
            if logged_in {
                info!(%platform, "login concluído e sessão persistida");
            } else {
                warn!(%platform, "login não concluído");
            }
            Ok(logged_in)
        }
        Action::Verify => {
            let valid = context.auth().verify_session(adapter).await?;
            render(
                &StatusReport {
                    platform: platform.to_string(),
                    status: AuthStatus {
                        session_file_exists: context.store.exists(adapter.platform_name()),
                        session_valid: valid,
                        authenticated: valid,
                    },
                },
                cli.format,
            )?;
            Ok(valid)
        }
        Action::Status => {
            let status = context.auth().status(adapter).await?;
            render(
                &StatusReport {
                    platform: platform.to_string(),
                    status,
                },
                cli.format,
            )?;
            Ok(status.authenticated)
        }
        Action::Upload(args) => {
            let request = build_request(args)?;
            let pipeline = context.pipeline(args.headless);
            let result = pipeline.run(adapter, &request, !args.no_auto_login).await;
            render(&result, cli.format)?;
            Ok(result.succeeded)
        }
    }
}

struct AppContext {
    config: CrosspostConfig,
    store: Arc<CredentialStore>,
    pool: Arc<BrowserPool>,
}

impl AppContext {
    fn new(config: CrosspostConfig) -> Self {
        let store = Arc::new(CredentialStore::new(&config.paths.base_dir));
        let launcher = ChromiumLauncher::new(config.browser.clone());
        let pool = Arc::new(BrowserPool::new(
            Box::new(launcher),
            Duration::from_secs(config.browser.close_grace_seconds),
        ));
        Self {
            config,
            store,
            pool,
        }
    }

    fn executable_path(&self) -> Option<PathBuf> {
        self.config
            .browser
            .executable_path
            .as_ref()
            .map(PathBuf::from)
    }

    fn auth(&self) -> AuthManager {
        AuthManager::new(
            Arc::clone(&self.store),
            Arc::clone(&self.pool),
            self.config.auth.clone(),
            self.executable_path(),
        )
    }

    fn pipeline(&self, force_headless: bool) -> PublishPipeline {
        let headless = force_headless || self.config.browser.headless;
        let launch = LaunchOptions {
            headless,
            executable_path: self.executable_path(),
        };
        PublishPipeline::new(
            Arc::clone(&self.store),
            Arc::clone(&self.pool),
            self.auth(),
            self.config.publish.clone(),
            launch,
        )
    }
}

fn build_request(args: &UploadArgs) -> Result<PublishRequest> {
    if !args.file.exists() {
        return Err(AppError::InvalidArgument(format!(
            "arquivo de vídeo não encontrado: {}",
            args.file.display()
        )));
    }

    let mut title = args.title.clone();
    let mut description = args.content.clone();
    let mut tags = args.tags.clone();

    if let Some(txt) = &args.txt {
        if txt.exists() {
            let sidecar = read_sidecar(txt)?;
            info!(path = %txt.display(), "metadados carregados do arquivo texto");
            title = Some(sidecar.title);
            description = Some(sidecar.description);
            tags = sidecar.tags;
        } else {
            warn!(path = %txt.display(), "arquivo texto não existe; ignorando");
        }
    }

    let title = title
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| file_stem(&args.file));

    let mut request = PublishRequest::new(&args.file, title);
    request.description = description.unwrap_or_default();
    request.tags = tags
        .into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect();
    request.cover_path = args.thumbnail.clone();
    if let Some(raw) = &args.publish_date {
        request.scheduled_at = Some(parse_publish_date(raw)?);
    }
    Ok(request)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "untitled".to_string())
}

pub fn parse_publish_date(raw: &str) -> Result<DateTime<Local>> {
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M").map_err(|_| {
        AppError::InvalidArgument(format!(
            "data de publicação inválida '{raw}'; use o formato YYYY-MM-DD HH:MM"
        ))
    })?;
    Local.from_local_datetime(&naive).single().ok_or_else(|| {
        AppError::InvalidArgument(format!("data de publicação ambígua no fuso local: {raw}"))
    })
}

#[derive(Debug, Clone)]
pub struct SidecarMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

/// Sidecar layout: first non-empty line is the title, the rest is the
/// description; `#hashtags` anywhere in the description become tags, in
/// order of appearance.
pub fn read_sidecar(path: &Path) -> Result<SidecarMetadata> {
    let content = std::fs::read_to_string(path)?;
    let mut lines = content.lines().skip_while(|line| line.trim().is_empty());
    let title = lines.next().unwrap_or_default().trim().to_string();
    let description_lines: Vec<&str> = lines.collect();
    let description = description_lines.join("\n").trim().to_string();

    let tags = description
        .split_whitespace()
        .filter_map(|token| token.strip_prefix('#'))
        .map(|tag| tag.trim_matches(|ch: char| ch.is_ascii_punctuation()).to_string())
        .filter(|tag| !tag.is_empty())
        .collect();

    Ok(SidecarMetadata {
        title,
        description,
        tags,
    })
}

#[derive(Debug, Serialize)]
struct StatusReport {
    platform: String,
    #[serde(flatten)]
    status: AuthStatus,
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

impl DisplayFallback for StatusReport {
    fn display(&self) -> String {
        let yes_no = |flag: bool| if flag { "sim" } else { "não" };
        format!(
            "{}\n  arquivo de sessão: {}\n  sessão válida: {}\n  autenticado: {}",
            self.platform.to_uppercase(),
            yes_no(self.status.session_file_exists),
            yes_no(self.status.session_valid),
            yes_no(self.status.authenticated),
        )
    }
}

impl DisplayFallback for PublishResult {
    fn display(&self) -> String {
        let mut out = format!(
            "{}: {} (estágio {})",
            self.platform,
            if self.succeeded { "publicado" } else { "falhou" },
            self.stage,
        );
        if let Some(url) = &self.last_url {
            out.push_str(&format!("\n  última URL: {url}"));
        }
        for warning in &self.warnings {
            out.push_str(&format!("\n  aviso: {warning}"));
        }
        if let Some(failure) = &self.failure {
            out.push_str(&format!("\n  motivo: {failure}"));
        }
        out
    }
}
