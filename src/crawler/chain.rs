//! The crawl chain: a single global queue of listing-page tasks
//!
//! Listing pages are served from one server-side search session, so they are
//! walked strictly one at a time. The chain hands out its next task only when
//! the active one has enumerated its records or failed. Follow-up pages of a
//! search are appended to the back of the queue, which interleaves lineages
//! breadth-first.

use crate::crawler::{pagination, seeds};
use std::collections::VecDeque;

/// Identifier of a chain task, unique within one crawl
pub type TaskId = u64;

/// What a chain task fetches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    /// First page of a prefix search
    Search,

    /// A follow-up page replaying the search's cleaned state token
    Page { token: String, page: u32 },
}

/// One listing-page fetch in the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTask {
    pub id: TaskId,

    /// Seed symbol of the search this task belongs to
    pub lineage: char,

    pub kind: TaskKind,
}

impl CrawlTask {
    /// Form fields to POST for this task
    pub fn form(&self, page_size: u32) -> Vec<(String, String)> {
        let mut form = seeds::search_form(self.lineage, page_size);
        if let TaskKind::Page { token, page } = &self.kind {
            pagination::apply_page_fields(&mut form, token, *page);
        }
        form
    }

    /// Page number within the lineage
    pub fn page(&self) -> u32 {
        match &self.kind {
            TaskKind::Search => 1,
            TaskKind::Page { page, .. } => *page,
        }
    }
}

/// A chain task that did not reach its enumeration step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainFailure {
    pub task_id: TaskId,
    pub lineage: char,
    pub page: u32,
    pub reason: String,
}

/// Global FIFO of listing-page tasks with at most one task released
#[derive(Debug, Default)]
pub struct CrawlChain {
    queue: VecDeque<CrawlTask>,
    active: Option<CrawlTask>,
    next_id: TaskId,
    released: u64,
    failures: Vec<ChainFailure>,
}

impl CrawlChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a task to the back of the queue and returns its id
    pub fn enqueue(&mut self, lineage: char, kind: TaskKind) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        self.queue.push_back(CrawlTask { id, lineage, kind });
        id
    }

    /// Releases the first task if nothing is active
    pub fn start(&mut self) -> Option<CrawlTask> {
        if self.active.is_some() {
            return None;
        }
        self.release()
    }

    /// Marks the active task as having enumerated its records and releases
    /// the next one
    ///
    /// Returns `None` when `id` is not the active task or the queue is empty.
    pub fn enumeration_done(&mut self, id: TaskId) -> Option<CrawlTask> {
        if !self.is_active(id) {
            tracing::warn!("Chain task {} finished but is not the active task", id);
            return None;
        }
        self.release()
    }

    /// Records a failure of the active task and releases the next one
    pub fn fail(&mut self, id: TaskId, reason: impl Into<String>) -> Option<CrawlTask> {
        let Some(task) = self.active.as_ref().filter(|task| task.id == id) else {
            tracing::warn!("Chain task {} failed but is not the active task", id);
            return None;
        };

        self.failures.push(ChainFailure {
            task_id: task.id,
            lineage: task.lineage,
            page: task.page(),
            reason: reason.into(),
        });
        self.release()
    }

    /// Task currently released, if any
    pub fn active(&self) -> Option<&CrawlTask> {
        self.active.as_ref()
    }

    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    /// True once nothing is active and nothing is queued
    pub fn is_drained(&self) -> bool {
        self.active.is_none() && self.queue.is_empty()
    }

    /// Number of tasks released so far
    pub fn released(&self) -> u64 {
        self.released
    }

    pub fn failures(&self) -> &[ChainFailure] {
        &self.failures
    }

    fn is_active(&self, id: TaskId) -> bool {
        self.active.as_ref().is_some_and(|task| task.id == id)
    }

    fn release(&mut self) -> Option<CrawlTask> {
        self.active = self.queue.pop_front();
        if self.active.is_some() {
            self.released += 1;
        }
        self.active.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(token: &str, page: u32) -> TaskKind {
        TaskKind::Page {
            token: token.to_string(),
            page,
        }
    }

    #[test]
    fn test_releases_one_task_at_a_time() {
        let mut chain = CrawlChain::new();
        let first = chain.enqueue('a', TaskKind::Search);
        let second = chain.enqueue('b', TaskKind::Search);

        let task = chain.start().unwrap();
        assert_eq!(task.id, first);
        assert_eq!(chain.released(), 1);

        // Already active
        assert!(chain.start().is_none());
        assert_eq!(chain.pending_len(), 1);

        let task = chain.enumeration_done(first).unwrap();
        assert_eq!(task.id, second);
        assert!(chain.enumeration_done(second).is_none());
        assert!(chain.is_drained());
    }

    #[test]
    fn test_follow_up_pages_go_to_the_back() {
        let mut chain = CrawlChain::new();
        let a = chain.enqueue('a', TaskKind::Search);
        chain.enqueue('b', TaskKind::Search);

        chain.start().unwrap();
        chain.enqueue('a', page("tok", 2));
        chain.enqueue('a', page("tok", 3));

        let order: Vec<(char, u32)> = std::iter::successors(chain.enumeration_done(a), |task| {
            chain.enumeration_done(task.id)
        })
        .map(|task| (task.lineage, task.page()))
        .collect();

        assert_eq!(order, vec![('b', 1), ('a', 2), ('a', 3)]);
    }

    #[test]
    fn test_failure_releases_next_and_is_recorded() {
        let mut chain = CrawlChain::new();
        let a = chain.enqueue('a', TaskKind::Search);
        let b = chain.enqueue('b', TaskKind::Search);

        chain.start().unwrap();
        let next = chain.fail(a, "HTTP 500").unwrap();
        assert_eq!(next.id, b);

        assert_eq!(chain.failures().len(), 1);
        assert_eq!(chain.failures()[0].lineage, 'a');
        assert_eq!(chain.failures()[0].page, 1);
        assert_eq!(chain.failures()[0].reason, "HTTP 500");
    }

    #[test]
    fn test_stale_completion_is_ignored() {
        let mut chain = CrawlChain::new();
        let a = chain.enqueue('a', TaskKind::Search);
        chain.enqueue('b', TaskKind::Search);

        chain.start().unwrap();
        chain.enumeration_done(a).unwrap();

        assert!(chain.enumeration_done(a).is_none());
        assert!(chain.fail(a, "late").is_none());
        assert!(chain.failures().is_empty());
        assert!(chain.active().is_some());
    }

    #[test]
    fn test_page_form_replays_token() {
        let task = CrawlTask {
            id: 0,
            lineage: 'a',
            kind: page("dG9rZW4=", 4),
        };
        let form = task.form(100);
        let get = |name: &str| {
            form.iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("QueryStringFind"), Some("dG9rZW4="));
        assert_eq!(get("IsPostBack"), Some("true"));
        assert_eq!(get("ValueSubmit"), Some("4"));
        assert_eq!(get("FProps[0].CritElems[0].Val"), Some("a"));
    }
}
