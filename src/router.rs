//! Route paths to different loaders by prefix, e.g. `http://` to the network and everything else to disk.
use crate::*;

type BoxedLoader = Box<dyn Loader + Send + Sync>;

#[derive(Default)]
pub struct LoaderRouter {
    routes: Vec<(String, BoxedLoader)>,
}

impl LoaderRouter {
    pub fn new() -> LoaderRouter {
        Default::default()
    }

    /// Send paths starting with `prefix` to `loader`.  The longest matching prefix wins; the empty prefix matches
    /// everything.  Registering a prefix again replaces its loader.
    pub fn route(mut self, prefix: &str, loader: impl Loader + Send + Sync + 'static) -> LoaderRouter {
        self.routes.retain(|(p, _)| p != prefix);
        self.routes.push((prefix.to_string(), Box::new(loader)));
        self.routes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    fn loader_for(&self, path: &str) -> Option<&BoxedLoader> {
        self.routes
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, l)| l)
    }
}

impl Loader for LoaderRouter {
    fn start(&self, request: &LoadRequest<'_>) -> Result<Box<dyn LoadHandle>, LoadError> {
        match self.loader_for(request.path) {
            Some(l) => l.start(request),
            None => Err(LoadError::Unsupported {
                path: request.path.to_string(),
                reason: "no loader is registered for this path".into(),
            }),
        }
    }
}
