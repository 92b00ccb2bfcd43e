//! The handler-bearing server: rpc method map, before/after hook chains, and
//! the per-call context.
//!
//! Hooks are plain data consulted at dispatch time; no handler is ever
//! wrapped or redefined. The in-flight request is never stored on the server
//! itself: a fresh `CallContext` is passed to every hook and handler, so one
//! server instance serves concurrent dispatches safely.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::RpcError;
use crate::operation::{Arguments, ArityRange};
use crate::service::Service;

/// Which wire protocol produced the current dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    JsonRpc,
    XmlRpc,
}

/// The inbound request reference for exactly one dispatch. Built by the
/// router per request and threaded through by argument.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub protocol: Protocol,
    pub path: String,
    pub content_type: Option<String>,
}

/// One declared handler parameter, captured at registration time. Named
/// arguments are translated into positional calls from these declarations,
/// never by runtime introspection.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub required: bool,
}

impl ParamSpec {
    pub fn required(name: &'static str) -> Self {
        Self {
            name,
            required: true,
        }
    }

    pub fn optional(name: &'static str) -> Self {
        Self {
            name,
            required: false,
        }
    }
}

type HandlerFn = Box<dyn Fn(&CallContext, Vec<Value>) -> Result<Value, RpcError> + Send + Sync>;
type HookFn = Box<dyn Fn(&CallContext) -> Result<(), RpcError> + Send + Sync>;

/// Restricts a hook to a subset of server method names.
#[derive(Debug, Clone, Default)]
pub struct HookFilter {
    only: Option<HashSet<String>>,
    except: Option<HashSet<String>>,
}

impl HookFilter {
    /// Applies to every method.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            only: Some(names.into_iter().map(Into::into).collect()),
            except: None,
        }
    }

    pub fn except<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            only: None,
            except: Some(names.into_iter().map(Into::into).collect()),
        }
    }

    /// A hook applies when its filter is empty, when `only` lists the method,
    /// or when `except` does not list it.
    pub fn applies(&self, method_name: &str) -> bool {
        match (&self.only, &self.except) {
            (None, None) => true,
            (Some(only), _) if only.contains(method_name) => true,
            (_, Some(except)) => !except.contains(method_name),
            _ => false,
        }
    }
}

struct Hook {
    filter: HookFilter,
    action: HookFn,
}

struct MethodEntry {
    method_name: String,
    params: Vec<ParamSpec>,
    handler: HandlerFn,
}

/// An RPC server: a method map plus hook chains and an operation registry,
/// built once and read-only at dispatch time.
pub struct Server {
    methods: HashMap<String, MethodEntry>,
    before: Vec<Hook>,
    after: Vec<Hook>,
    service: Service,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// The `rpc[name]` lookup: the server method name published under an rpc
    /// name, if any.
    pub fn method_name(&self, rpc_name: &str) -> Option<&str> {
        self.methods
            .get(rpc_name)
            .map(|entry| entry.method_name.as_str())
    }

    /// All published rpc names, sorted for stable listings.
    pub fn rpc_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    /// Dispatches one call: argument translation and arity checks first, then
    /// applicable before hooks in registration order, then the handler, then
    /// applicable after hooks. A failing before hook
    /// prevents the handler; a failing handler skips the after hooks; a
    /// failing after hook propagates even though the result was produced.
    pub fn invoke(
        &self,
        rpc_name: &str,
        args: Arguments,
        ctx: &CallContext,
    ) -> Result<Value, RpcError> {
        let entry = self
            .methods
            .get(rpc_name)
            .ok_or_else(|| RpcError::method_not_found(rpc_name))?;

        let positional = match args {
            Arguments::Positional(values) => {
                let arity = positional_arity(&entry.params);
                if !arity.contains(values.len()) {
                    return Err(RpcError::invalid_params(format!(
                        "wrong number of arguments (given {}, expected {})",
                        values.len(),
                        arity
                    )));
                }
                values
            }
            Arguments::Named(map) => named_to_positional(&entry.params, &map)?,
        };

        for hook in &self.before {
            if hook.filter.applies(&entry.method_name) {
                (hook.action)(ctx)?;
            }
        }

        debug!(rpc_name, method = %entry.method_name, "invoking handler");
        let result = (entry.handler)(ctx, positional)?;

        for hook in &self.after {
            if hook.filter.applies(&entry.method_name) {
                (hook.action)(ctx)?;
            }
        }

        Ok(result)
    }
}

/// Argument-count bounds implied by a parameter declaration: every required
/// name, at most every name. Checked before the handler sees the list, so a
/// handler may index into its declared arguments.
fn positional_arity(params: &[ParamSpec]) -> ArityRange {
    ArityRange {
        min: params.iter().filter(|param| param.required).count(),
        max: params.len(),
    }
}

/// Translates a named-argument map into a positional call using the declared
/// parameter order. Required names must all be present, unknown names are
/// rejected, and unsupplied trailing optionals are omitted rather than
/// defaulted.
fn named_to_positional(
    params: &[ParamSpec],
    map: &Map<String, Value>,
) -> Result<Vec<Value>, RpcError> {
    let missing: Vec<&str> = params
        .iter()
        .filter(|param| param.required && !map.contains_key(param.name))
        .map(|param| param.name)
        .collect();
    if !missing.is_empty() {
        return Err(RpcError::invalid_params(format!(
            "missing parameters: {}",
            missing.join(", ")
        )));
    }

    let unknown: Vec<&str> = map
        .keys()
        .filter(|key| !params.iter().any(|param| param.name == key.as_str()))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(RpcError::invalid_params(format!(
            "unknown parameters: {}",
            unknown.join(", ")
        )));
    }

    let Some(last_present) = params.iter().rposition(|param| map.contains_key(param.name)) else {
        return Ok(Vec::new());
    };
    Ok(params[..=last_present]
        .iter()
        .map(|param| map.get(param.name).cloned().unwrap_or(Value::Null))
        .collect())
}

#[derive(Default)]
pub struct ServerBuilder {
    methods: HashMap<String, MethodEntry>,
    before: Vec<Hook>,
    after: Vec<Hook>,
    service: Service,
}

impl ServerBuilder {
    /// Publishes a handler under an rpc name. Later registrations for the
    /// same rpc name overwrite silently.
    pub fn rpc<F>(
        mut self,
        rpc_name: impl Into<String>,
        method_name: impl Into<String>,
        params: Vec<ParamSpec>,
        handler: F,
    ) -> Self
    where
        F: Fn(&CallContext, Vec<Value>) -> Result<Value, RpcError> + Send + Sync + 'static,
    {
        self.methods.insert(
            rpc_name.into(),
            MethodEntry {
                method_name: method_name.into(),
                params,
                handler: Box::new(handler),
            },
        );
        self
    }

    pub fn before_filter<F>(mut self, filter: HookFilter, action: F) -> Self
    where
        F: Fn(&CallContext) -> Result<(), RpcError> + Send + Sync + 'static,
    {
        self.before.push(Hook {
            filter,
            action: Box::new(action),
        });
        self
    }

    pub fn after_filter<F>(mut self, filter: HookFilter, action: F) -> Self
    where
        F: Fn(&CallContext) -> Result<(), RpcError> + Send + Sync + 'static,
    {
        self.after.push(Hook {
            filter,
            action: Box::new(action),
        });
        self
    }

    pub fn service(mut self, service: Service) -> Self {
        self.service = service;
        self
    }

    pub fn build(self) -> Server {
        Server {
            methods: self.methods,
            before: self.before,
            after: self.after,
            service: self.service,
        }
    }
}
