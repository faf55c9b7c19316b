//! Redirect callback fired on logout and on authentication expiry.
//!
//! The embedding application decides what "go to the login page" means; the
//! client only reports the configured login path.

pub trait Navigator: Send + Sync {
    fn redirect(&self, path: &str);
}

impl<F> Navigator for F
where
    F: Fn(&str) + Send + Sync,
{
    fn redirect(&self, path: &str) {
        self(path)
    }
}

/// Navigator that ignores redirects.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn redirect(&self, _path: &str) {}
}
