use std::sync::Arc;

use log::info;
use rocket::figment::providers::{Env, Format, Toml};
use rocket::figment::{Figment, Profile};
use rocket::routes;

use harveylib::config::Config;
use harveylib::dispatcher::Dispatcher;
use harveylib::pipelines::PipelineContext;
use harveylib::sparql::{HttpSparqlClient, SparqlClient};

use crate::routes::{delta, find_and_start_unfinished_tasks, force_retry_task, index};

mod errors;
mod routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_module("harvey", log::LevelFilter::Debug)
        .filter_module("harveylib", log::LevelFilter::Debug)
        .init();

    let config = Arc::new(Config::load()?);
    info!("harvey starting up against {}", config.sparql_endpoint);

    let client: Arc<dyn SparqlClient> =
        Arc::new(HttpSparqlClient::new(config.sparql_endpoint.clone()));
    let batch_client: Arc<dyn SparqlClient> = match &config.batch_sparql_endpoint {
        Some(endpoint) => Arc::new(HttpSparqlClient::new(endpoint.clone())),
        None => client.clone(),
    };

    let dispatcher = Arc::new(Dispatcher::new(PipelineContext::new(
        config, client, batch_client,
    )));

    // Pick up tasks that were interrupted mid-flight by the last restart.
    let resume_dispatcher = dispatcher.clone();
    tokio::spawn(async move { resume_dispatcher.resume_unfinished().await });

    // Took from rocket source code and added .split("__") to be able to add keys in nested structures.
    let rocket_config_figment = Figment::from(rocket::Config::default())
        .merge(Toml::file(Env::var_or("ROCKET_CONFIG", "Rocket.toml")).nested())
        .merge(
            Env::prefixed("ROCKET_")
                .ignore(&["PROFILE"])
                .split("__")
                .global(),
        )
        .select(Profile::from_env_or(
            "ROCKET_PROFILE",
            rocket::Config::DEFAULT_PROFILE,
        ));

    rocket::custom(rocket_config_figment)
        .manage(dispatcher)
        .mount(
            "/",
            routes![
                index,
                delta,
                find_and_start_unfinished_tasks,
                force_retry_task
            ],
        )
        .launch()
        .await?;

    Ok(())
}
