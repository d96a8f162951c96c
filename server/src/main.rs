mod config;
mod graphql;
mod http;

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use platform_authn::issue_token;
use platform_authz::{ComponentId, CurrentUser, RoleCatalog, UserType, can_access_component};
use platform_backend::{ApiClient, RoleService};
use platform_obs::{ObsConfig, init_tracing};
use products_finance::RouteTree;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    http::{AppState, ServeConfig},
};

#[derive(Parser, Debug)]
#[command(name = "finadmin", version, about = "Finance admin access service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP + GraphQL server.
    Serve(ServeCommand),
    /// Print the role catalog (backend roles merged over defaults) as JSON.
    Roles,
    /// Decide whether a user type or role may see a component.
    Check {
        /// User type or role name, e.g. ACCOUNTANT or super_admin.
        subject: String,
        /// Component id, e.g. REVENUE_FORM.
        component: String,
    },
    /// Mint a development session token.
    Token(TokenCommand),
    /// Print the GraphQL schema.
    #[command(name = "schema:print")]
    SchemaPrint,
}

#[derive(Args, Debug)]
struct ServeCommand {
    #[arg(long, default_value = "0.0.0.0")]
    host: std::net::IpAddr,
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

impl From<&ServeCommand> for ServeConfig {
    fn from(value: &ServeCommand) -> Self {
        ServeConfig::new(value.host, value.port)
    }
}

#[derive(Args, Debug)]
struct TokenCommand {
    #[arg(long)]
    email: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long, value_name = "USER_TYPE")]
    user_type: Option<String>,
    #[arg(long = "role", value_name = "ROLE")]
    roles: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let _obs = init_tracing(ObsConfig::from_env())?;
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(cmd) => run_server(cmd).await,
        Command::Roles => print_roles().await,
        Command::Check { subject, component } => check_access(&subject, &component),
        Command::Token(cmd) => mint_token(cmd),
        Command::SchemaPrint => {
            println!("{}", graphql::build_schema(Arc::new(RouteTree::finance())).sdl());
            Ok(())
        }
    }
}

fn backend_client(config: Option<&platform_backend::BackendConfig>) -> Result<Option<ApiClient>> {
    config
        .map(ApiClient::new)
        .transpose()
        .context("invalid backend configuration")
}

async fn run_server(cmd: ServeCommand) -> Result<()> {
    let config = Arc::new(AppConfig::load()?);
    let backend = backend_client(config.backend.as_ref())?;
    let routes = Arc::new(RouteTree::finance());
    let state = AppState {
        schema: graphql::build_schema(routes.clone()),
        routes,
        catalog: Arc::new(RwLock::new(RoleCatalog::defaults())),
        backend,
        config,
    };
    let roles = state.reload_catalog().await;
    info!(roles, backend = state.backend.is_some(), "role catalog ready");
    http::serve((&cmd).into(), state).await
}

async fn print_roles() -> Result<()> {
    let backend = config::backend_from_env()?;
    let client = backend_client(backend.as_ref())?;
    let roles = RoleService::new(client).list_roles().await;
    println!("{}", serde_json::to_string_pretty(&roles)?);
    Ok(())
}

fn check_access(subject: &str, component: &str) -> Result<()> {
    let component =
        ComponentId::parse(component).ok_or_else(|| anyhow!("unknown component {component}"))?;
    let verdict = if can_access_component(subject, component) {
        "allowed"
    } else {
        "denied"
    };
    println!("{subject} -> {component}: {verdict}");
    Ok(())
}

fn mint_token(cmd: TokenCommand) -> Result<()> {
    let config = AppConfig::load()?;
    let user_type = cmd
        .user_type
        .as_deref()
        .map(|raw| UserType::parse(raw).ok_or_else(|| anyhow!("unknown user type {raw}")))
        .transpose()?;
    let user = CurrentUser {
        id: Uuid::new_v4(),
        email: cmd.email,
        name: cmd.name,
        user_type,
        roles: cmd.roles,
    };
    let token = issue_token(&user, &config.auth)?;
    println!("{token}");
    Ok(())
}
