use envconfig::Envconfig;
use kms_grant_lambda::adapters::kms::KmsGrantClient;
use kms_grant_lambda::adapters::response::HttpResponseSender;
use kms_grant_lambda::config::{Config, NonEmptyString};
use kms_grant_lambda::handlers::custom_resource::respond_to_payload;
use kms_grant_lambda::handlers::grant::GrantHandler;
use kms_grant_lambda::logging::init_logging;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::{json, Value};

struct RuntimeDependencies {
    handler: GrantHandler<KmsGrantClient>,
    response_sender: HttpResponseSender,
}

async fn handle_request(
    event: LambdaEvent<Value>,
    deps: &RuntimeDependencies,
) -> Result<Value, Error> {
    let response = respond_to_payload(
        &event.payload,
        &deps.handler,
        &deps.response_sender,
        &event.context.env_config.log_stream,
    )
    .await
    .map_err(|error| {
        tracing::error!(error = %error, "custom resource response was not delivered");
        Error::from(error)
    })?;

    Ok(json!({
        "status": response.status,
        "physical_resource_id": response.physical_resource_id,
    }))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::init_from_env()
        .map_err(|error| Error::from(format!("invalid configuration: {error}")))?;
    init_logging(config.log_format);

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let deps = RuntimeDependencies {
        handler: GrantHandler::new(KmsGrantClient::from_sdk_config(
            &aws_config,
            config.kms_endpoint_url.as_ref().map(NonEmptyString::as_str),
        )),
        response_sender: HttpResponseSender::new(config.response_timeout.0)?,
    };
    let deps = &deps;

    lambda_runtime::run(service_fn(move |event| handle_request(event, deps))).await
}
