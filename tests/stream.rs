//! Tests for paginated result streams.

use ironlro::rpc::{PageRequest, ResultPage};
use ironlro::stream::{PageStream, PaginationConfig, StreamError};
use ironlro::testing::numbered_pages;

#[test]
fn test_three_pages_in_token_order_without_fourth_fetch() {
    let pages = numbered_pages(3, 2);
    let mut tokens = Vec::new();
    let stream = PageStream::new(PaginationConfig::default(), |req: &PageRequest| {
        tokens.push(req.token.clone());
        Ok::<_, String>(pages[req.index as usize].clone())
    });

    let items = stream.collect_all().unwrap();
    assert_eq!(items, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(
        tokens,
        vec![None, Some("t1".to_string()), Some("t2".to_string())]
    );
}

#[test]
fn test_stream_is_lazy() {
    let pages = numbered_pages(3, 2);
    let mut fetches = 0;
    let mut stream = PageStream::new(PaginationConfig::default(), |req: &PageRequest| {
        fetches += 1;
        Ok::<_, String>(pages[req.index as usize].clone())
    });

    assert_eq!(stream.next().unwrap().unwrap(), 0);
    assert_eq!(stream.next().unwrap().unwrap(), 1);
    assert_eq!(stream.pages_fetched(), 1);
    assert_eq!(stream.next().unwrap().unwrap(), 2);
    assert_eq!(stream.pages_fetched(), 2);
    drop(stream);
    assert_eq!(fetches, 2);
}

#[test]
fn test_repeated_token_is_invalid_page() {
    let mut fetches = 0;
    let mut stream = PageStream::new(PaginationConfig::default(), |_: &PageRequest| {
        fetches += 1;
        Ok::<_, String>(ResultPage::with_token(vec![fetches], "same"))
    });

    assert_eq!(stream.next().unwrap().unwrap(), 1);
    match stream.next() {
        Some(Err(StreamError::InvalidPage { page, .. })) => assert_eq!(page, 1),
        other => panic!("expected invalid page, got {other:?}"),
    }
    assert!(stream.next().is_none());
    drop(stream);
    assert_eq!(fetches, 2);
}

#[test]
fn test_fetch_error_ends_stream() {
    let pages = numbered_pages(3, 1);
    let mut fetches = 0;
    let mut stream = PageStream::new(PaginationConfig::default(), |req: &PageRequest| {
        fetches += 1;
        if req.index == 1 {
            Err("connection reset".to_string())
        } else {
            Ok(pages[req.index as usize].clone())
        }
    });

    assert_eq!(stream.next().unwrap().unwrap(), 0);
    let err = stream.next().unwrap().unwrap_err();
    assert_eq!(err.page(), 1);
    assert!(matches!(err, StreamError::Fetch { ref error, .. } if error == "connection reset"));
    assert!(stream.next().is_none());
    assert!(stream.next().is_none());
    drop(stream);
    assert_eq!(fetches, 2);
}

#[test]
fn test_empty_listing() {
    let stream = PageStream::new(PaginationConfig::default(), |_: &PageRequest| {
        Ok::<_, String>(ResultPage::<u32>::last(Vec::new()))
    });
    assert!(stream.collect_all().unwrap().is_empty());
}

#[test]
fn test_empty_middle_page_is_skipped() {
    let pages = vec![
        ResultPage::with_token(vec!["a"], "t1"),
        ResultPage::with_token(vec![], "t2"),
        ResultPage::last(vec!["b"]),
    ];
    let stream = PageStream::new(PaginationConfig::default(), |req: &PageRequest| {
        Ok::<_, String>(pages[req.index as usize].clone())
    });
    assert_eq!(stream.collect_all().unwrap(), vec!["a", "b"]);
}
