//! Pending job queue with priority insertion and flood control

use crate::logging::job::{DatabaseJob, FloodKey, JobId};
use std::collections::{HashMap, VecDeque};

pub const DEFAULT_MAX_QUEUE_LENGTH: usize = 1000;
pub const DEFAULT_FLOOD_LIMIT: usize = 10;

/// FIFO of jobs waiting for the execution slot.
///
/// Priority jobs go to the head. Once the queue is longer than
/// `max_queue_length`, an append whose flood key already has more than
/// `flood_limit` queued jobs evicts the oldest queued job for that key.
pub(crate) struct JobQueue {
    jobs: VecDeque<DatabaseJob>,
    flood_index: HashMap<FloodKey, VecDeque<JobId>>,
    max_queue_length: usize,
    flood_limit: usize,
}

impl JobQueue {
    pub fn new(max_queue_length: usize, flood_limit: usize) -> Self {
        Self {
            jobs: VecDeque::new(),
            flood_index: HashMap::new(),
            max_queue_length,
            flood_limit,
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Number of queued jobs sharing `key`
    pub fn queued_for(&self, key: &FloodKey) -> usize {
        self.flood_index.get(key).map_or(0, VecDeque::len)
    }

    /// Enqueue a job. Returns the job evicted by flood control, if any.
    pub fn push(&mut self, job: DatabaseJob, priority: bool) -> Option<DatabaseJob> {
        let mut discarded = None;

        if let Some(key) = job.flood_key() {
            if self.jobs.len() > self.max_queue_length && self.queued_for(&key) > self.flood_limit {
                discarded = self.discard_oldest(&key);
            }
            self.flood_index.entry(key).or_default().push_back(job.id());
        }

        if priority {
            self.jobs.push_front(job);
        } else {
            self.jobs.push_back(job);
        }

        discarded
    }

    pub fn pop_front(&mut self) -> Option<DatabaseJob> {
        let job = self.jobs.pop_front()?;
        if let Some(key) = job.flood_key() {
            self.forget(&key, job.id());
        }
        Some(job)
    }

    /// Drop every queued job, used when the database is gone for good
    pub fn drain(&mut self) -> impl Iterator<Item = DatabaseJob> + '_ {
        self.flood_index.clear();
        self.jobs.drain(..)
    }

    fn discard_oldest(&mut self, key: &FloodKey) -> Option<DatabaseJob> {
        let id = self.flood_index.get_mut(key)?.pop_front()?;
        let position = self.jobs.iter().position(|job| job.id() == id)?;
        self.jobs.remove(position)
    }

    fn forget(&mut self, key: &FloodKey, id: JobId) {
        if let Some(ids) = self.flood_index.get_mut(key) {
            if let Some(position) = ids.iter().position(|queued| *queued == id) {
                ids.remove(position);
            }
            if ids.is_empty() {
                self.flood_index.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::entry::{LogEntry, LoggingSource};
    use crate::logging::job::JobKind;
    use crate::logging::types::ThingId;
    use uuid::Uuid;

    fn append(id: JobId, key: FloodKey) -> DatabaseJob {
        let entry = LogEntry::new(LoggingSource::Events)
            .with_type_id(key.type_id)
            .with_thing_id(key.thing_id);
        DatabaseJob::new(id, JobKind::Append(entry), String::new(), vec![])
    }

    fn random_key() -> FloodKey {
        FloodKey {
            type_id: Uuid::new_v4(),
            thing_id: ThingId::new_v4(),
        }
    }

    #[test]
    fn test_priority_jobs_go_first() {
        let mut queue = JobQueue::new(DEFAULT_MAX_QUEUE_LENGTH, DEFAULT_FLOOD_LIMIT);
        queue.push(append(1, random_key()), false);
        queue.push(append(2, random_key()), false);
        queue.push(DatabaseJob::new(3, JobKind::CountEntries, String::new(), vec![]), true);

        let order: Vec<JobId> = std::iter::from_fn(|| queue.pop_front()).map(|j| j.id()).collect();
        assert_eq!(order, vec![3, 1, 2]);
    }

    #[test]
    fn test_flood_control_keeps_newest() {
        let mut queue = JobQueue::new(DEFAULT_MAX_QUEUE_LENGTH, DEFAULT_FLOOD_LIMIT);
        for id in 0..=DEFAULT_MAX_QUEUE_LENGTH as JobId {
            assert!(queue.push(append(id, random_key()), false).is_none());
        }

        let key = random_key();
        let first = 10_000;
        let mut discarded = Vec::new();
        for id in first..first + 20 {
            if let Some(job) = queue.push(append(id, key), false) {
                discarded.push(job.id());
            }
            assert!(queue.queued_for(&key) <= DEFAULT_FLOOD_LIMIT + 1);
        }

        assert_eq!(queue.queued_for(&key), DEFAULT_FLOOD_LIMIT + 1);
        assert_eq!(discarded, (first..first + 9).collect::<Vec<_>>());

        let survivors: Vec<JobId> = std::iter::from_fn(|| queue.pop_front())
            .map(|j| j.id())
            .filter(|id| *id >= first)
            .collect();
        assert_eq!(survivors.last(), Some(&(first + 19)));
        assert_eq!(survivors.len(), DEFAULT_FLOOD_LIMIT + 1);
    }

    #[test]
    fn test_no_flood_control_below_threshold() {
        let mut queue = JobQueue::new(DEFAULT_MAX_QUEUE_LENGTH, DEFAULT_FLOOD_LIMIT);
        let key = random_key();
        for id in 0..50 {
            assert!(queue.push(append(id, key), false).is_none());
        }
        assert_eq!(queue.queued_for(&key), 50);
    }

    #[test]
    fn test_pop_updates_flood_index() {
        let mut queue = JobQueue::new(DEFAULT_MAX_QUEUE_LENGTH, DEFAULT_FLOOD_LIMIT);
        let key = random_key();
        queue.push(append(1, key), false);
        queue.push(append(2, key), false);

        queue.pop_front();
        assert_eq!(queue.queued_for(&key), 1);
        queue.pop_front();
        assert_eq!(queue.queued_for(&key), 0);
        assert!(queue.is_empty());
    }
}
