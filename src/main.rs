use clap::Parser;
use tracing::{error, info, warn};

use sandbox_cni::cni::PluginClientFactory;
use sandbox_cni::config::cli::{print_default_config, CliArgs, Command};
use sandbox_cni::config::{load_configuration, AppConfig, LogFormat};
use sandbox_cni::error::AppError;
use sandbox_cni::network::{NamespaceLifecycle, NetworkConfig, NetworkNamespace, Sandbox};
use sandbox_cni::{DefaultCniNetwork, NetworkError};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = CliArgs::parse();

    if cli.print_default_config {
        print_default_config();
        return Ok(());
    }

    let config = load_configuration(&cli)?;
    init_logging(&config);

    if cli.validate_config {
        info!(conf_dir = %config.cni_conf_dir, "Configuration is valid");
        return Ok(());
    }

    let network = DefaultCniNetwork::from_config(&config);

    match cli.command {
        Some(Command::Add {
            sandbox_id,
            interfaces,
            netns,
            state,
        }) => {
            let request = NetworkConfig {
                num_interfaces: interfaces,
                netns_path: netns,
            };
            add(&network, Sandbox::new(sandbox_id), &request, state.as_deref()).await
        }
        Some(Command::Remove { sandbox_id, state }) => {
            remove(&network, Sandbox::new(sandbox_id), &state).await
        }
        Some(Command::Check) => check(&network),
        None => {
            info!("No command given, nothing to do");
            Ok(())
        }
    }
}

fn init_logging(config: &AppConfig) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.log_level.as_str())
        .with_writer(std::io::stderr);

    match config.log_format {
        LogFormat::Full => builder.init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

async fn add(
    network: &DefaultCniNetwork,
    sandbox: Sandbox,
    request: &NetworkConfig,
    state: Option<&str>,
) -> Result<(), AppError> {
    let (netns_path, created) = network.init(request)?;

    let netns = match network.add(&sandbox, request, &netns_path, created).await {
        Ok(netns) => netns,
        Err(e) => {
            error!(sandbox = %sandbox.id, "Failed to add network: {}", e);
            // Endpoints attached before the failure are not recoverable here
            if created {
                if let Err(cleanup) = network.namespaces().delete_net_ns(&netns_path, true) {
                    warn!(netns = %netns_path, "Failed to delete namespace after error: {}", cleanup);
                }
            }
            return Err(e.into());
        }
    };

    let record = serde_json::to_string_pretty(&netns)?;
    match state {
        Some(path) => {
            tokio::fs::write(path, record).await?;
            info!(state = path, "Wrote namespace record");
        }
        None => println!("{}", record),
    }

    Ok(())
}

async fn remove(network: &DefaultCniNetwork, sandbox: Sandbox, state: &str) -> Result<(), AppError> {
    let record = tokio::fs::read_to_string(state).await?;
    let netns: NetworkNamespace = serde_json::from_str(&record)?;

    network.remove(&sandbox, &netns).await?;
    info!(sandbox = %sandbox.id, netns = %netns.netns_path, "Removed network");
    Ok(())
}

fn check(network: &DefaultCniNetwork) -> Result<(), AppError> {
    let client = network
        .plugins()
        .new_client()
        .map_err(NetworkError::ProviderUnavailable)?;

    let conf = client.network();
    println!("network: {} (cniVersion {})", conf.name, conf.cni_version);
    println!("config:  {}", conf.source.display());
    for (plugin, binary) in conf.plugins.iter().zip(client.plugin_binaries()) {
        println!("plugin:  {} -> {}", plugin.plugin_type, binary.display());
    }

    Ok(())
}
