#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::config::SchedulerConfig;
use crate::scheduler::Scheduler;
use crate::task::Promise;
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

type Calls = Arc<Mutex<Vec<usize>>>;

/// Serves `0..len` in pages of at most `cap` elements, reporting `total`
fn slice(len: usize, query: PageQuery, cap: usize, total: Option<usize>) -> Page<usize> {
    let start = query.index.min(len);
    let end = query.end().min(len).min(query.index.saturating_add(cap));
    Page::new((start..end.max(start)).collect(), query.index, query.page_size, total)
}

/// A remote collection of `len` elements that records every requested index
fn collection(
    len: usize,
    cap: usize,
    total: Option<usize>,
) -> (impl Fn(PageQuery) -> Task<Page<usize>> + Send + Sync + 'static, Calls) {
    let calls: Calls = Arc::default();
    let log = calls.clone();
    let requester = move |query: PageQuery| {
        log.lock().unwrap().push(query.index);
        Task::of(slice(len, query, cap, total))
    };
    (requester, calls)
}

fn nothing(_: PageQuery) -> Task<Page<usize>> {
    Task::absent()
}

fn broken(_: PageQuery) -> Task<Page<usize>> {
    Task::failed(Error::Other("down".into()))
}

fn scheduler() -> Scheduler {
    Scheduler::new(&SchedulerConfig::default()).unwrap()
}

fn drain_eager(pages: EagerPages<usize>) -> Vec<usize> {
    pages.map(|item| item.unwrap()).collect()
}

/// Waits on each task in turn, stopping at the first absent one
fn drain_pipelined(pages: PipelinedPages<usize>) -> Vec<usize> {
    let mut out = Vec::new();
    for task in pages {
        match task.wait_optional().unwrap() {
            Some(item) => out.push(item),
            None => break,
        }
    }
    out
}

// -----------------------------------------------------------------------
// Shared types
// -----------------------------------------------------------------------

#[test]
fn test_page_query_arguments() {
    let query = PageQuery::at(100, 50);
    assert_eq!(query.end(), 150);
    assert_eq!(query.append_to("/v1/mods/search"), "/v1/mods/search?index=100&pageSize=50");
    assert_eq!(
        query.append_to("/v1/mods/search?gameId=432"),
        "/v1/mods/search?gameId=432&index=100&pageSize=50"
    );
}

#[test]
fn test_page_decodes_envelope() {
    let json = r#"{
        "data": ["a", "b"],
        "pagination": {"index": 50, "pageSize": 50, "resultCount": 2, "totalCount": 52}
    }"#;
    let page: Page<String> = serde_json::from_str(json).unwrap();

    assert_eq!(page.items, vec!["a", "b"]);
    assert_eq!(page.pagination.index, 50);
    assert_eq!(page.pagination.result_count, 2);
    assert_eq!(page.pagination.total_count, Some(52));
}

#[test]
fn test_page_total_count_is_optional() {
    let json = r#"{"data": [1], "pagination": {"index": 0, "pageSize": 50, "resultCount": 1}}"#;
    let page: Page<u32> = serde_json::from_str(json).unwrap();
    assert_eq!(page.pagination.total_count, None);
}

#[test]
fn test_sequence_len_without_total() {
    let query = PageQuery::at(50, 50);
    let full = Page::new((50..100).collect::<Vec<_>>(), 50, 50, None);
    let short = Page::new((50..70).collect::<Vec<_>>(), 50, 50, None);
    let counted = Page::new((50..70).collect::<Vec<_>>(), 50, 50, Some(300));

    assert_eq!(full.sequence_len(&query), usize::MAX);
    assert_eq!(short.sequence_len(&query), 70);
    assert_eq!(counted.sequence_len(&query), 300);
}

// -----------------------------------------------------------------------
// Eager
// -----------------------------------------------------------------------

#[test]
fn test_eager_walks_125_elements_in_three_requests() {
    let (requester, calls) = collection(125, usize::MAX, Some(125));
    let mut pages = EagerPages::create(requester, 50).unwrap();

    for expected in 0..125 {
        assert!(pages.has_next(), "has_next should be true before element {expected}");
        assert_eq!(pages.fetch_next().unwrap(), expected);
    }

    assert!(!pages.has_next());
    assert!(matches!(pages.fetch_next(), Err(Error::Exhausted)));
    assert_eq!(*calls.lock().unwrap(), vec![0, 50, 100]);
}

#[test]
fn test_eager_absent_first_page_is_exhausted() {
    let mut pages = EagerPages::create(nothing, 50).unwrap();

    assert!(!pages.has_next());
    assert!(matches!(pages.fetch_next(), Err(Error::Exhausted)));
}

#[test]
fn test_eager_zero_total_is_exhausted() {
    let (requester, calls) = collection(0, usize::MAX, Some(0));
    let mut pages = EagerPages::create(requester, 50).unwrap();

    assert!(!pages.has_next());
    assert!(pages.next().is_none());
    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[test]
fn test_eager_rejects_zero_page_size() {
    let (requester, calls) = collection(10, usize::MAX, Some(10));
    let err = EagerPages::create(requester, 0).unwrap_err();

    assert!(matches!(err, Error::Config { .. }));
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn test_eager_first_page_failure_fails_creation() {
    let result = EagerPages::create(broken, 50);
    assert_eq!(result.unwrap_err().to_string(), "down");
}

#[test]
fn test_eager_absent_page_truncates_sequence() {
    let requester = |query: PageQuery| {
        if query.index >= 50 {
            Task::absent()
        } else {
            Task::of(slice(125, query, usize::MAX, Some(125)))
        }
    };
    let pages = EagerPages::create(requester, 50).unwrap();

    assert_eq!(drain_eager(pages), (0..50).collect::<Vec<_>>());
}

#[test]
fn test_eager_failed_page_is_reported_once() {
    let requester = |query: PageQuery| {
        if query.index == 50 {
            Task::failed(Error::Status {
                status: 500,
                body: String::new(),
            })
        } else {
            Task::of(slice(125, query, usize::MAX, Some(125)))
        }
    };
    let mut pages = EagerPages::create(requester, 50).unwrap();

    for expected in 0..50 {
        assert_eq!(pages.next().unwrap().unwrap(), expected);
    }
    assert_eq!(pages.next().unwrap().unwrap_err().status(), Some(500));
    assert!(pages.next().is_none());
    assert!(!pages.has_next());
}

#[test]
fn test_eager_without_total_stops_at_short_page() {
    let (requester, calls) = collection(120, usize::MAX, None);
    let pages = EagerPages::create(requester, 50).unwrap();

    assert_eq!(drain_eager(pages), (0..120).collect::<Vec<_>>());
    assert_eq!(*calls.lock().unwrap(), vec![0, 50, 100]);
}

#[test]
fn test_eager_without_total_stops_at_empty_page() {
    let (requester, calls) = collection(100, usize::MAX, None);
    let pages = EagerPages::create(requester, 50).unwrap();

    assert_eq!(drain_eager(pages), (0..100).collect::<Vec<_>>());
    assert_eq!(*calls.lock().unwrap(), vec![0, 50, 100]);
}

#[test]
fn test_eager_requeries_after_short_pages() {
    // The remote caps every page at 30 elements
    let (requester, calls) = collection(125, 30, Some(125));
    let pages = EagerPages::create(requester, 50).unwrap();

    assert_eq!(drain_eager(pages), (0..125).collect::<Vec<_>>());
    assert_eq!(*calls.lock().unwrap(), vec![0, 30, 60, 90, 120]);
}

#[test]
fn test_eager_follows_most_recent_total() {
    let requester = |query: PageQuery| {
        let total = if query.index == 0 { 125 } else { 60 };
        Task::of(slice(125, query, usize::MAX, Some(total)))
    };
    let pages = EagerPages::create(requester, 50).unwrap();

    assert_eq!(drain_eager(pages), (0..60).collect::<Vec<_>>());
}

#[test]
fn test_eager_with_spawned_requests() {
    let scheduler = scheduler();
    let worker = scheduler.clone();
    let requester = move |query: PageQuery| {
        Task::spawn(&worker, async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            Ok(Some(slice(75, query, usize::MAX, Some(75))))
        })
    };
    let pages = EagerPages::create(requester, 20).unwrap();

    assert_eq!(drain_eager(pages), (0..75).collect::<Vec<_>>());
}

// -----------------------------------------------------------------------
// Pipelined
// -----------------------------------------------------------------------

#[test]
fn test_pipelined_hands_out_125_tasks_without_waiting() {
    let scheduler = scheduler();
    let (requester, calls) = collection(125, usize::MAX, Some(125));
    let mut pages = PipelinedPages::create(&scheduler, requester, 50).wait().unwrap();

    let mut tasks = Vec::new();
    for _ in 0..125 {
        assert!(pages.has_next());
        tasks.push(pages.next_task().unwrap());
    }
    assert!(!pages.has_next());
    assert!(matches!(pages.next_task(), Err(Error::Exhausted)));

    let values: Vec<usize> = tasks.into_iter().map(|task| task.wait().unwrap()).collect();
    assert_eq!(values, (0..125).collect::<Vec<_>>());

    let mut requested = calls.lock().unwrap().clone();
    requested.sort_unstable();
    assert_eq!(requested, vec![0, 50, 100]);
}

/// A requester whose pages are completed by the test, in any order
fn manual() -> (
    impl Fn(PageQuery) -> Task<Page<usize>> + Send + Sync + 'static,
    mpsc::Receiver<(PageQuery, Promise<Page<usize>>)>,
) {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let requester = move |query: PageQuery| {
        let (promise, task) = Task::pending();
        tx.lock().unwrap().send((query, promise)).ok();
        task
    };
    (requester, rx)
}

#[test]
fn test_pipelined_pages_arriving_out_of_order() {
    let scheduler = scheduler();
    let (requester, requests) = manual();
    let created = PipelinedPages::create(&scheduler, requester, 10);

    let (first, promise) = requests.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(first, PageQuery::at(0, 10));
    promise.fulfill(slice(30, first, usize::MAX, Some(30)));
    let mut pages = created.wait().unwrap();

    let tasks: Vec<_> = (0..30).map(|_| pages.next_task().unwrap()).collect();
    assert!(format!("{:?}", tasks[15]).contains("pending"));

    let (second, second_promise) = requests.recv_timeout(TIMEOUT).unwrap();
    let (third, third_promise) = requests.recv_timeout(TIMEOUT).unwrap();
    assert_eq!((second.index, third.index), (10, 20));

    // Later page first
    third_promise.fulfill(slice(30, third, usize::MAX, Some(30)));
    second_promise.fulfill(slice(30, second, usize::MAX, Some(30)));

    let values: Vec<usize> = tasks.into_iter().map(|task| task.wait().unwrap()).collect();
    assert_eq!(values, (0..30).collect::<Vec<_>>());
    assert!(requests.try_recv().is_err(), "no request past the end");
}

#[test]
fn test_pipelined_prefetch_is_request_driven() {
    let scheduler = scheduler();
    let (requester, requests) = manual();
    let created = PipelinedPages::create(&scheduler, requester, 10);

    let (first, promise) = requests.recv_timeout(TIMEOUT).unwrap();
    promise.fulfill(slice(100, first, usize::MAX, Some(100)));
    let mut pages = created.wait().unwrap();

    // Handing out nine elements does not reach the end of the buffered page
    let _early: Vec<_> = (0..9).map(|_| pages.next_task().unwrap()).collect();
    assert!(requests.recv_timeout(Duration::from_millis(100)).is_err());

    // The tenth does, even though nothing has been awaited
    let _last = pages.next_task().unwrap();
    let (next, _promise) = requests.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(next, PageQuery::at(10, 10));
}

#[test]
fn test_pipelined_absent_first_page_is_exhausted() {
    let scheduler = scheduler();
    let mut pages = PipelinedPages::create(&scheduler, nothing, 50)
        .wait()
        .unwrap();

    assert!(!pages.has_next());
    assert!(matches!(pages.next_task(), Err(Error::Exhausted)));
}

#[test]
fn test_pipelined_zero_total_is_exhausted() {
    let scheduler = scheduler();
    let (requester, _calls) = collection(0, usize::MAX, Some(0));
    let mut pages = PipelinedPages::create(&scheduler, requester, 50).wait().unwrap();

    assert!(!pages.has_next());
    assert!(pages.next().is_none());
}

#[test]
fn test_pipelined_rejects_zero_page_size() {
    let scheduler = scheduler();
    let (requester, _calls) = collection(10, usize::MAX, Some(10));
    let created = PipelinedPages::create(&scheduler, requester, 0);

    assert!(matches!(created.wait(), Err(Error::Config { .. })));
}

#[test]
fn test_pipelined_first_page_failure_fails_creation() {
    let scheduler = scheduler();
    let created = PipelinedPages::create(&scheduler, broken, 50);
    assert_eq!(created.wait().unwrap_err().to_string(), "down");
}

#[test]
fn test_pipelined_failed_page_fails_its_elements_and_ends() {
    let scheduler = scheduler();
    let (requester, requests) = manual();
    let created = PipelinedPages::create(&scheduler, requester, 50);

    let (first, promise) = requests.recv_timeout(TIMEOUT).unwrap();
    promise.fulfill(slice(125, first, usize::MAX, Some(125)));
    let mut pages = created.wait().unwrap();

    let tasks: Vec<_> = (0..100).map(|_| pages.next_task().unwrap()).collect();
    let (second, second_promise) = requests.recv_timeout(TIMEOUT).unwrap();
    let (third, third_promise) = requests.recv_timeout(TIMEOUT).unwrap();
    assert_eq!((second.index, third.index), (50, 100));

    second_promise.fail(Error::Status {
        status: 502,
        body: "bad gateway".into(),
    });
    third_promise.fulfill(slice(125, third, usize::MAX, Some(125)));

    let mut tasks = tasks.into_iter();
    for expected in 0..50 {
        assert_eq!(tasks.next().unwrap().wait().unwrap(), expected);
    }
    for task in tasks {
        match task.wait() {
            Err(Error::Page { index, source }) => {
                assert_eq!(index, 50);
                assert_eq!(source.status(), Some(502));
            }
            other => panic!("expected a page failure, got {other:?}"),
        }
    }

    assert!(!pages.has_next());
    assert!(matches!(pages.next_task(), Err(Error::Exhausted)));
}

/// Polls the fetcher's debug output until `needle` shows up
fn settle_until(pages: &PipelinedPages<usize>, needle: &str) {
    let deadline = std::time::Instant::now() + TIMEOUT;
    while !format!("{pages:?}").contains(needle) {
        assert!(std::time::Instant::now() < deadline, "never saw {needle}: {pages:?}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_pipelined_earlier_failure_discards_later_page() {
    let scheduler = scheduler();
    let (requester, requests) = manual();
    let created = PipelinedPages::create(&scheduler, requester, 10);

    let (first, promise) = requests.recv_timeout(TIMEOUT).unwrap();
    promise.fulfill(slice(30, first, usize::MAX, Some(30)));
    let mut pages = created.wait().unwrap();

    let tasks: Vec<_> = (0..30).map(|_| pages.next_task().unwrap()).collect();
    let (second, second_promise) = requests.recv_timeout(TIMEOUT).unwrap();
    let (third, third_promise) = requests.recv_timeout(TIMEOUT).unwrap();
    assert_eq!((second.index, third.index), (10, 20));

    // The later page lands and is held back behind the one still in flight
    third_promise.fulfill(slice(30, third, usize::MAX, Some(30)));
    settle_until(&pages, "in_flight: 1, ready: 10");

    second_promise.fail(Error::Other("down".into()));

    let outcomes: Vec<_> = tasks.into_iter().map(Task::wait_optional).collect();
    for (expected, outcome) in outcomes[..10].iter().enumerate() {
        assert_eq!(*outcome.as_ref().unwrap(), Some(expected));
    }
    for outcome in &outcomes[10..20] {
        assert!(matches!(outcome, Err(Error::Page { index: 10, .. })), "{outcome:?}");
    }
    for outcome in &outcomes[20..] {
        assert!(matches!(outcome, Ok(None)), "{outcome:?}");
    }
    assert!(!pages.has_next());
}

#[test]
fn test_pipelined_absent_page_resolves_placeholders_as_absent() {
    let scheduler = scheduler();
    let requester = |query: PageQuery| {
        if query.index >= 50 {
            Task::absent()
        } else {
            Task::of(slice(125, query, usize::MAX, Some(125)))
        }
    };
    let mut pages = PipelinedPages::create(&scheduler, requester, 50).wait().unwrap();

    let first: Vec<_> = (0..50).map(|_| pages.next_task().unwrap()).collect();
    for (expected, task) in first.into_iter().enumerate() {
        assert_eq!(task.wait().unwrap(), expected);
    }

    // Either handed out before the absence landed and resolved absent, or refused
    if let Ok(task) = pages.next_task() {
        assert!(task.wait_optional().unwrap().is_none());
    }
    assert!(!pages.has_next());
}

#[test]
fn test_pipelined_without_total_stops_at_short_page() {
    let scheduler = scheduler();
    let (requester, calls) = collection(120, usize::MAX, None);
    let pages = PipelinedPages::create(&scheduler, requester, 50).wait().unwrap();

    assert_eq!(drain_pipelined(pages), (0..120).collect::<Vec<_>>());
    assert_eq!(calls.lock().unwrap().len(), 3);
}

#[test]
fn test_pipelined_without_total_stops_at_empty_page() {
    let scheduler = scheduler();
    let (requester, _calls) = collection(100, usize::MAX, None);
    let pages = PipelinedPages::create(&scheduler, requester, 50).wait().unwrap();

    assert_eq!(drain_pipelined(pages), (0..100).collect::<Vec<_>>());
}

#[test]
fn test_pipelined_fills_gaps_left_by_short_pages() {
    let scheduler = scheduler();
    let (requester, calls) = collection(125, 30, Some(125));
    let mut pages = PipelinedPages::create(&scheduler, requester, 50).wait().unwrap();

    let tasks: Vec<_> = std::iter::from_fn(|| pages.next_task().ok()).collect();
    let values: Vec<usize> = tasks.into_iter().map(|task| task.wait().unwrap()).collect();

    assert_eq!(values, (0..125).collect::<Vec<_>>());
    let requested = calls.lock().unwrap();
    assert!(requested.contains(&30), "gap after the first page is requested: {requested:?}");
}

#[test]
fn test_pipelined_total_only_shrinks() {
    let scheduler = scheduler();
    let requester = |query: PageQuery| {
        let total = if query.index == 0 { 125 } else { 60 };
        Task::of(slice(125, query, usize::MAX, Some(total)))
    };
    let pages = PipelinedPages::create(&scheduler, requester, 50).wait().unwrap();

    assert_eq!(drain_pipelined(pages), (0..60).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pipelined_inside_async_code() {
    let scheduler = Scheduler::current().unwrap();
    let worker = scheduler.clone();
    let requester = move |query: PageQuery| {
        Task::spawn(&worker, async move { Ok(Some(slice(42, query, usize::MAX, Some(42)))) })
    };

    let pages = PipelinedPages::create(&scheduler, requester, 10).await.unwrap().unwrap();
    let mut values = Vec::new();
    for task in pages {
        values.push(task.await.unwrap().unwrap());
    }

    assert_eq!(values, (0..42).collect::<Vec<_>>());
}
