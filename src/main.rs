use rpc_endpoint::{
    build_app,
    config::Config,
    errors::RpcError,
    logging,
    operand::{OperandKind, OperandSpec},
    operation::{OperandValues, Operation},
    server::{CallContext, HookFilter, ParamSpec, Server},
    service::Service,
    EndpointState,
};
use serde_json::{json, Value};
use tracing::info;

struct Add {
    x: f64,
    y: f64,
}

impl Operation for Add {
    fn operands() -> Vec<OperandSpec> {
        vec![
            OperandSpec::new("x", OperandKind::Float),
            OperandSpec::new("y", OperandKind::Float),
        ]
    }

    fn from_values(values: OperandValues, _ctx: CallContext) -> Result<Self, RpcError> {
        Ok(Self {
            x: values.require_f64("x")?,
            y: values.require_f64("y")?,
        })
    }

    fn execute(&self) -> Result<Value, RpcError> {
        Ok(json!(self.x + self.y))
    }
}

struct Multiply {
    x: f64,
    y: f64,
}

impl Operation for Multiply {
    fn operands() -> Vec<OperandSpec> {
        vec![
            OperandSpec::new("x", OperandKind::Float),
            OperandSpec::new("y", OperandKind::Float),
        ]
    }

    fn from_values(values: OperandValues, _ctx: CallContext) -> Result<Self, RpcError> {
        Ok(Self {
            x: values.require_f64("x")?,
            y: values.require_f64("y")?,
        })
    }

    fn execute(&self) -> Result<Value, RpcError> {
        Ok(json!(self.x * self.y))
    }
}

fn demo_server() -> Server {
    Server::builder()
        .service(Service::new().operator::<Add>().operator::<Multiply>())
        .rpc("demo.echo", "echo", vec![ParamSpec::required("message")], |_ctx, args| {
            Ok(args.first().cloned().unwrap_or(Value::Null))
        })
        .rpc("demo.protocol", "protocol", Vec::new(), |ctx, _args| {
            Ok(json!(format!("{:?}", ctx.protocol)))
        })
        .before_filter(HookFilter::all(), |ctx| {
            info!(path = %ctx.path, "rpc call received");
            Ok(())
        })
        .build()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let bind_socket = config.bind_socket()?;
    let state = EndpointState::new(demo_server(), &config.rpc_path, config.xmlrpc.clone());
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        rpc_path = %config.rpc_path,
        "server starting"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
