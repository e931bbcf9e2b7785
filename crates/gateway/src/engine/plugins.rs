//! Engine plugins and landing-page selection.
//!
//! A plugin participates in the engine's readiness step and may supply a
//! landing page for browser requests to the mount path. The gateway picks
//! the landing-page plugin from the resolved playground setting and prepends
//! it to the user's own plugins, unless passthrough mode hands control to
//! the user list entirely.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

/// A hook into the engine's lifecycle.
#[async_trait]
pub trait EnginePlugin: Send + Sync {
    /// Runs during [`Engine::start`](crate::engine::Engine::start), in plugin
    /// order. The first failure aborts assembly.
    ///
    /// # Errors
    ///
    /// Any error fails the engine's readiness step.
    async fn on_start(&self) -> Result<()> {
        Ok(())
    }

    /// HTML served to browser requests on the mount path. The first plugin
    /// returning a page wins.
    fn landing_page(&self) -> Option<String> {
        None
    }
}

/// Resolved landing-page behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandingPageSelection {
    /// Serve the interactive query page.
    Interactive,
    /// Serve no landing page.
    Disabled,
    /// Use the user-supplied plugin list unmodified.
    Passthrough,
}

/// Compute the engine's plugin list from the resolved selection and the
/// user-supplied plugins.
pub fn select(
    selection: LandingPageSelection,
    mount_path: &str,
    user: Vec<Arc<dyn EnginePlugin>>,
) -> Vec<Arc<dyn EnginePlugin>> {
    match selection {
        LandingPageSelection::Passthrough => user,
        LandingPageSelection::Interactive => {
            prepend(Arc::new(InteractiveLandingPage::new(mount_path)), user)
        }
        LandingPageSelection::Disabled => prepend(Arc::new(LandingPageDisabled), user),
    }
}

fn prepend(
    first: Arc<dyn EnginePlugin>,
    rest: Vec<Arc<dyn EnginePlugin>>,
) -> Vec<Arc<dyn EnginePlugin>> {
    let mut plugins = Vec::with_capacity(rest.len() + 1);
    plugins.push(first);
    plugins.extend(rest);
    plugins
}

// ---------------------------------------------------------------------------
// Built-in landing pages
// ---------------------------------------------------------------------------

/// Serves an interactive query page for browser requests.
pub struct InteractiveLandingPage {
    endpoint: String,
}

impl InteractiveLandingPage {
    /// Build the page for the given mount path.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl EnginePlugin for InteractiveLandingPage {
    async fn on_start(&self) -> Result<()> {
        debug!(endpoint = %self.endpoint, "interactive landing page enabled");
        Ok(())
    }

    fn landing_page(&self) -> Option<String> {
        Some(LANDING_PAGE_TEMPLATE.replace("__ENDPOINT__", &self.endpoint))
    }
}

/// Suppresses the landing page; browser requests without a query get a
/// method-not-allowed response instead.
pub struct LandingPageDisabled;

#[async_trait]
impl EnginePlugin for LandingPageDisabled {
    async fn on_start(&self) -> Result<()> {
        debug!("landing page disabled");
        Ok(())
    }
}

const LANDING_PAGE_TEMPLATE: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>GraphQL API</title>
  <style>
    body { margin: 0; height: 100vh; }
    #graphiql { height: 100vh; }
  </style>
  <link rel="stylesheet" href="https://unpkg.com/graphiql/graphiql.min.css" />
</head>
<body>
  <div id="graphiql">Loading the query editor...</div>
  <script src="https://unpkg.com/react/umd/react.production.min.js"></script>
  <script src="https://unpkg.com/react-dom/umd/react-dom.production.min.js"></script>
  <script src="https://unpkg.com/graphiql/graphiql.min.js"></script>
  <script>
    ReactDOM.render(
      React.createElement(GraphiQL, {
        fetcher: GraphiQL.createFetcher({ url: '__ENDPOINT__' }),
      }),
      document.getElementById('graphiql')
    );
  </script>
</body>
</html>
"#;
