//! Pending generation requests.
//!
//! Requests are dispatched in queue order. A page is queued at most once:
//! a second request for the same page keeps the first one's position and
//! the trigger with the smallest path, so one merged change window always
//! reports the same cause.

use crate::script::Trigger;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub page: String,
    /// The page's `generate` target at the time it was queued.
    pub target: String,
    pub trigger: Option<Trigger>,
}

#[derive(Debug, Default)]
pub struct GenerationQueue {
    requests: Vec<Request>,
}

impl GenerationQueue {
    /// Queue a request. Returns `false` if it was merged into an existing one.
    pub fn push(&mut self, request: Request) -> bool {
        let Some(existing) = self.requests.iter_mut().find(|r| r.page == request.page) else {
            self.requests.push(request);
            return true;
        };

        existing.target = request.target;
        let replace = match (&existing.trigger, &request.trigger) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(old), Some(new)) => new.path < old.path,
        };
        if replace {
            existing.trigger = request.trigger;
        }
        false
    }

    /// Take every request, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.requests)
    }

    pub fn remove_page(&mut self, page: &str) {
        self.requests.retain(|r| r.page != page);
    }

    #[cfg(test)]
    pub fn contains(&self, page: &str) -> bool {
        self.requests.iter().any(|r| r.page == page)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ChangeReason;

    fn request(page: &str, trigger: Option<&str>) -> Request {
        Request {
            page: page.to_string(),
            target: page.to_string(),
            trigger: trigger.map(|path| Trigger {
                path: path.into(),
                reason: ChangeReason::Modified,
            }),
        }
    }

    #[test]
    fn test_coalesce_keeps_position_and_smallest_trigger() {
        let mut queue = GenerationQueue::default();
        assert!(queue.push(request("b", Some("/data/z.json"))));
        assert!(queue.push(request("a", None)));
        assert!(!queue.push(request("b", Some("/data/a.json"))));
        assert!(!queue.push(request("b", Some("/data/m.json"))));
        assert!(!queue.push(request("a", Some("/data/q.json"))));

        let drained = queue.drain();
        assert!(queue.is_empty());
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].page, "b");
        assert_eq!(
            drained[0].trigger.as_ref().unwrap().path,
            std::path::PathBuf::from("/data/a.json")
        );
        assert!(drained[1].trigger.is_some());
    }

    #[test]
    fn test_remove_page() {
        let mut queue = GenerationQueue::default();
        queue.push(request("a", None));
        queue.push(request("b", None));
        queue.remove_page("a");
        queue.remove_page("a");
        assert!(!queue.contains("a"));
        assert_eq!(queue.len(), 1);
    }
}
