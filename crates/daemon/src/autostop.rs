use chatwatch_core::{ObserverHandle, SurfaceSignal};

/// Decide whether `signal`, reported by `from`, ends the session watched by
/// `monitored`. Returns the human-readable stop reason.
pub fn evaluate(
    active: bool,
    monitored: Option<&ObserverHandle>,
    from: &ObserverHandle,
    signal: SurfaceSignal,
) -> Option<&'static str> {
    if !active {
        return None;
    }
    let monitored = monitored?;
    let same_surface = monitored == from;
    match signal {
        SurfaceSignal::Hidden if same_surface => {
            Some("Monitoring stopped because the page was hidden")
        }
        SurfaceSignal::Closed if same_surface => {
            Some("Monitoring stopped because the tab was closed")
        }
        SurfaceSignal::FocusLost if same_surface => {
            Some("Monitoring stopped because the window lost focus")
        }
        // another surface coming forward means the watched one lost focus
        SurfaceSignal::Activated if !same_surface => {
            Some("Monitoring stopped because another tab was activated")
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tab(name: &str) -> ObserverHandle {
        ObserverHandle::new(name)
    }

    #[test]
    fn test_signals_from_monitored_surface() {
        let watched = tab("tab-1");
        for signal in [
            SurfaceSignal::Hidden,
            SurfaceSignal::Closed,
            SurfaceSignal::FocusLost,
        ] {
            assert!(evaluate(true, Some(&watched), &watched, signal).is_some());
        }
        assert!(evaluate(true, Some(&watched), &watched, SurfaceSignal::Activated).is_none());
    }

    #[test]
    fn test_signals_from_other_surface() {
        let watched = tab("tab-1");
        let other = tab("tab-2");
        for signal in [
            SurfaceSignal::Hidden,
            SurfaceSignal::Closed,
            SurfaceSignal::FocusLost,
        ] {
            assert!(evaluate(true, Some(&watched), &other, signal).is_none());
        }
        assert_eq!(
            evaluate(true, Some(&watched), &other, SurfaceSignal::Activated),
            Some("Monitoring stopped because another tab was activated")
        );
    }

    #[test]
    fn test_inactive_or_untied_session_ignores_signals() {
        let watched = tab("tab-1");
        assert!(evaluate(false, Some(&watched), &watched, SurfaceSignal::Closed).is_none());
        assert!(evaluate(true, None, &watched, SurfaceSignal::Closed).is_none());
        assert!(evaluate(true, None, &watched, SurfaceSignal::Activated).is_none());
    }
}
