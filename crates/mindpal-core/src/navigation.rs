//! Host-supplied side effects of the access gate.
//!
//! `clear_session` and a denied `require_login` both leave the current view.
//! The session store only decides *that* this happens; the host decides
//! *how* (a page load, a terminal message, a router push).

pub trait Navigator {
    /// Present a blocking notice to the user.
    fn show_notice(&self, message: &str);

    /// Leave the current view for `location`. Fire-and-forget.
    fn navigate_to(&self, location: &str);
}

/// Navigator for hosts with nowhere to go, e.g. background jobs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn show_notice(&self, _message: &str) {}

    fn navigate_to(&self, _location: &str) {}
}

impl<N: Navigator + ?Sized> Navigator for &N {
    fn show_notice(&self, message: &str) {
        (**self).show_notice(message)
    }

    fn navigate_to(&self, location: &str) {
        (**self).navigate_to(location)
    }
}
