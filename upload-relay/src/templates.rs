//! The embedded upload form served at `GET /`.

use minijinja::{Environment, context};

use crate::config::Config;
use crate::errors::Error;

const INDEX: &str = "index.html";

/// Template environment, built once at startup.
#[derive(Clone)]
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    pub fn new() -> anyhow::Result<Self> {
        let mut env = Environment::new();
        env.add_template(INDEX, include_str!("../templates/index.html"))?;
        Ok(Self { env })
    }

    pub fn render_index(&self, config: &Config) -> Result<String, Error> {
        let accept = config
            .upload
            .allowed_extensions
            .iter()
            .map(|ext| format!(".{ext}"))
            .collect::<Vec<_>>()
            .join(",");

        self.env
            .get_template(INDEX)
            .and_then(|template| {
                template.render(context! {
                    secret_token => config.secret_token(),
                    accept => accept,
                })
            })
            .map_err(|e| Error::Internal {
                operation: format!("render {INDEX}: {e:#}"),
            })
    }
}
