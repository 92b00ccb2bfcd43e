use std::{env, net::SocketAddr};

use thiserror::Error;

use crate::proto::xmlrpc::XmlRpcOptions;

#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_path: String,
    pub bind_addr: String,
    pub bind_port: u16,
    pub xmlrpc: XmlRpcOptions,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("RPC_PATH must start with '/'")]
    InvalidPath,
    #[error("BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("{0} must be 'true' or 'false'")]
    InvalidToggle(&'static str),
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let rpc_path = env::var("RPC_PATH")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "/rpc".to_string());
        if !rpc_path.starts_with('/') {
            return Err(ConfigError::InvalidPath);
        }

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
        let bind_port = env::var("BIND_PORT")
            .ok()
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(8080);

        let xmlrpc = XmlRpcOptions {
            multicall: toggle("XMLRPC_MULTICALL")?,
            introspection: toggle("XMLRPC_INTROSPECTION")?,
            capabilities: toggle("XMLRPC_CAPABILITIES")?,
        };

        let config = Self {
            rpc_path,
            bind_addr,
            bind_port,
            xmlrpc,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }
}

fn toggle(name: &'static str) -> Result<bool, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(true),
        Ok(value) => match value.trim() {
            "" | "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(ConfigError::InvalidToggle(name)),
        },
    }
}
