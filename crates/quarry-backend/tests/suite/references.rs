//! Reference queries: local results, cross-dump fan-out, pagination.

use futures::future::BoxFuture;
use futures::FutureExt;

use quarry_backend::{CursorPhase, QueryError, ReferenceCursor, ReferencePage};
use quarry_core::{Dump, DumpId, MonikerKind, Position, RequestContext};
use quarry_dump::test_support::{dump, range_data, DocumentBuilder, FakeStoreBuilder};
use quarry_dump::{
    DocumentData, DumpStore, Model, MonikerRow, Pagination, ResultChunkData, StoreError,
};

use crate::{backend, range, reference_rows, references_request, MockMetadata, TestProvider};

fn page(dumps: &[Dump], total_count: u64, new_offset: u64) -> ReferencePage {
    ReferencePage {
        dumps: dumps.to_vec(),
        total_count,
        new_offset,
    }
}

/// A dump whose document has one symbol occurrence carrying an import
/// moniker for `npm util/x` (package `util@1.0.0`), plus a second document
/// reached through the reference result.
fn local_store() -> quarry_dump::test_support::FakeStore {
    let document = DocumentBuilder::new()
        .range(1, range_data(range(10, 0, 10, 7), None, Some(102), None, &[1]))
        .moniker(
            1,
            quarry_core::Moniker {
                kind: MonikerKind::Import,
                scheme: "npm".to_owned(),
                identifier: "util/x".to_owned(),
                package_information_id: Some(quarry_core::PackageInformationId::new(5)),
            },
        )
        .package_information(5, "util", Some("1.0.0"))
        .build();
    let other = DocumentBuilder::new()
        .range(2, range_data(range(5, 0, 5, 5), None, None, None, &[]))
        .build();
    FakeStoreBuilder::new()
        .document("a.ts", document)
        .document("b.ts", other)
        .result(102, &[("a.ts", 1), ("b.ts", 2)])
        .build()
}

/// Local references, the package dump's references and the same-repo remote
/// page all land in the initial answer.
#[tokio::test]
async fn initial_page_merges_local_package_and_same_repo_results() {
    let d1 = dump(1, 42, "abc", "");
    let package_dump = dump(3, 7, "zzz", "");
    let d4 = dump(4, 42, "def", "");

    let backend = backend(
        MockMetadata::default()
            .with_closest(std::slice::from_ref(&d1))
            .with_package("npm", "util", Some("1.0.0"), package_dump.clone())
            .with_same_repo_page(0, page(std::slice::from_ref(&d4), 1, 1)),
        TestProvider::default()
            .with_store(&d1.filename, local_store())
            .with_store(
                &package_dump.filename,
                reference_rows(&[("c.ts", 1), ("c.ts", 2), ("c.ts", 3)], "npm", "util/x"),
            )
            .with_store(&d4.filename, reference_rows(&[("d.ts", 8)], "npm", "util/x")),
    );

    let page = backend
        .references(
            &RequestContext::new(),
            references_request(42, "abc", "a.ts", Position::new(10, 4)),
        )
        .await
        .unwrap();

    assert_eq!(page.locations.len(), 6, "2 local + 3 package + 1 same-repo");
    assert!(page.cursor.is_none(), "both phases exhausted");

    let local: Vec<&str> = page.locations[..2].iter().map(|l| l.path.as_str()).collect();
    assert_eq!(local, vec!["a.ts", "b.ts"], "local results come first");
}

/// Duplicates between the local reference result and the moniker tables
/// collapse to one location.
#[tokio::test]
async fn the_initial_page_is_deduplicated() {
    let d1 = dump(1, 42, "abc", "");
    let document = DocumentBuilder::new()
        .range(1, range_data(range(10, 0, 10, 7), None, Some(102), None, &[1]))
        .moniker(
            1,
            quarry_core::Moniker {
                kind: MonikerKind::Export,
                scheme: "npm".to_owned(),
                identifier: "util/x".to_owned(),
                package_information_id: None,
            },
        )
        .build();
    let store = FakeStoreBuilder::new()
        .document("a.ts", document)
        .result(102, &[("a.ts", 1)])
        // The same occurrence again, via the reference table.
        .moniker_row(
            Model::Reference,
            MonikerRow {
                scheme: "npm".to_owned(),
                identifier: "util/x".to_owned(),
                path: "a.ts".to_owned(),
                range: range(10, 0, 10, 7),
            },
        )
        .build();

    let backend = backend(
        MockMetadata::default().with_closest(std::slice::from_ref(&d1)),
        TestProvider::default().with_store(&d1.filename, store),
    );
    let page = backend
        .references(
            &RequestContext::new(),
            references_request(42, "abc", "a.ts", Position::new(10, 4)),
        )
        .await
        .unwrap();

    assert_eq!(page.locations.len(), 1);
    assert!(page.cursor.is_none(), "an export moniker cannot page remotely");
}

/// Ranges without monikers mean nothing can leave the dump: local results
/// only, no cursor.
#[tokio::test]
async fn moniker_free_ranges_stay_local() {
    let d1 = dump(1, 42, "abc", "");
    let document = DocumentBuilder::new()
        .range(1, range_data(range(10, 0, 10, 7), None, Some(102), None, &[]))
        .build();
    let store = FakeStoreBuilder::new()
        .document("a.ts", document)
        .result(102, &[("a.ts", 1)])
        .build();

    let backend = backend(
        MockMetadata::default().with_closest(std::slice::from_ref(&d1)),
        TestProvider::default().with_store(&d1.filename, store),
    );
    let page = backend
        .references(
            &RequestContext::new(),
            references_request(42, "abc", "a.ts", Position::new(10, 4)),
        )
        .await
        .unwrap();

    assert_eq!(page.locations.len(), 1);
    assert!(page.cursor.is_none());
}

/// More same-repo dumps remain after the first page: the cursor advances
/// within the phase, then flips to remote-repo when that scope has content.
#[tokio::test]
async fn cursors_advance_within_and_across_phases() {
    let d1 = dump(1, 42, "abc", "");
    let d4 = dump(4, 42, "def", "");
    let d5 = dump(5, 42, "ghi", "");
    let d6 = dump(6, 77, "jkl", "");

    let backend = backend(
        MockMetadata::default()
            .with_closest(std::slice::from_ref(&d1))
            .with_package("npm", "util", Some("1.0.0"), dump(3, 7, "zzz", ""))
            .with_same_repo_page(0, page(std::slice::from_ref(&d4), 2, 1))
            .with_same_repo_page(1, page(std::slice::from_ref(&d5), 2, 2))
            .with_remote_page(0, page(std::slice::from_ref(&d6), 1, 1)),
        TestProvider::default()
            .with_store(&d1.filename, local_store())
            .with_store(&dump(3, 7, "zzz", "").filename, reference_rows(&[], "npm", "util/x"))
            .with_store(&d4.filename, reference_rows(&[("d.ts", 1)], "npm", "util/x"))
            .with_store(&d5.filename, reference_rows(&[("e.ts", 2)], "npm", "util/x"))
            .with_store(&d6.filename, reference_rows(&[("f.ts", 3)], "npm", "util/x")),
    );
    let ctx = RequestContext::new();

    // Page 1: local + first same-repo dump; one same-repo page remains.
    let first = backend
        .references(&ctx, references_request(42, "abc", "a.ts", Position::new(10, 4)))
        .await
        .unwrap();
    let cursor = first.cursor.clone().expect("same-repo pages remain");
    assert_eq!(cursor.phase, CursorPhase::SameRepo);
    assert_eq!(cursor.offset, 1);
    assert!(first.locations.iter().any(|l| l.path == "d.ts"));

    // Page 2: second same-repo dump; the remote scope has content, so the
    // phase flips instead of terminating.
    let mut request = references_request(42, "abc", "a.ts", Position::new(10, 4));
    request.cursor = Some(cursor);
    let second = backend.references(&ctx, request).await.unwrap();
    let cursor = second.cursor.clone().expect("remote scope has content");
    assert_eq!(cursor.phase, CursorPhase::RemoteRepo);
    assert_eq!(cursor.offset, 0);
    let paths: Vec<&str> = second.locations.iter().map(|l| l.path.as_str()).collect();
    assert_eq!(paths, vec!["e.ts"]);

    // Page 3: the remote dump, then the machine terminates.
    let mut request = references_request(42, "abc", "a.ts", Position::new(10, 4));
    request.cursor = Some(cursor);
    let third = backend.references(&ctx, request).await.unwrap();
    let paths: Vec<&str> = third.locations.iter().map(|l| l.path.as_str()).collect();
    assert_eq!(paths, vec!["f.ts"]);
    assert!(third.cursor.is_none());
}

/// The wire cursor round-trips through its opaque encoding between pages.
#[tokio::test]
async fn cursors_survive_the_wire_encoding() {
    let d1 = dump(1, 42, "abc", "");
    let d4 = dump(4, 42, "def", "");

    let backend = backend(
        MockMetadata::default()
            .with_closest(std::slice::from_ref(&d1))
            .with_package("npm", "util", Some("1.0.0"), dump(3, 7, "zzz", ""))
            .with_same_repo_page(0, page(std::slice::from_ref(&d4), 2, 1))
            .with_same_repo_page(1, page(&[], 2, 2)),
        TestProvider::default()
            .with_store(&d1.filename, local_store())
            .with_store(&dump(3, 7, "zzz", "").filename, reference_rows(&[], "npm", "util/x"))
            .with_store(&d4.filename, reference_rows(&[("d.ts", 1)], "npm", "util/x")),
    );
    let ctx = RequestContext::new();

    let first = backend
        .references(&ctx, references_request(42, "abc", "a.ts", Position::new(10, 4)))
        .await
        .unwrap();
    let token = first.cursor.expect("cursor present").encode();

    let mut request = references_request(42, "abc", "a.ts", Position::new(10, 4));
    request.cursor = Some(ReferenceCursor::decode(&token).unwrap());
    let second = backend.references(&ctx, request).await.unwrap();
    assert!(second.cursor.is_none());
}

/// A remote-repo continuation that exhausts the dependency rows terminates.
#[tokio::test]
async fn remote_continuations_terminate_at_the_total() {
    let d1 = dump(1, 42, "abc", "");
    let d5 = dump(5, 70, "aaa", "");
    let d6 = dump(6, 71, "bbb", "");
    let d7 = dump(7, 72, "ccc", "");

    let metadata = MockMetadata::default()
        .with_remote_page(10, page(&[d5.clone(), d6.clone(), d7.clone()], 12, 13));
    metadata.register(d1.clone());

    let backend = backend(
        metadata,
        TestProvider::default()
            .with_store(&d5.filename, reference_rows(&[("x.go", 1), ("x.go", 2), ("x.go", 3)], "gomod", "pkg/X"))
            .with_store(&d6.filename, reference_rows(&[("y.go", 1), ("y.go", 2)], "gomod", "pkg/X"))
            .with_store(&d7.filename, reference_rows(&[("z.go", 1), ("z.go", 2)], "gomod", "pkg/X")),
    );

    let mut request = references_request(42, "abc", "a.ts", Position::new(0, 0));
    request.cursor = Some(ReferenceCursor {
        dump_id: DumpId::new(1),
        scheme: "gomod".to_owned(),
        identifier: "pkg/X".to_owned(),
        name: "pkg".to_owned(),
        version: None,
        phase: CursorPhase::RemoteRepo,
        offset: 10,
    });
    let page = backend.references(&RequestContext::new(), request).await.unwrap();

    assert_eq!(page.locations.len(), 7);
    assert!(page.cursor.is_none(), "13 >= 12 exhausts the scope");
}

/// The dump a cursor references was deleted between requests: the result
/// set simply ends.
#[tokio::test]
async fn a_deleted_dump_ends_the_result_set() {
    let backend = backend(MockMetadata::default(), TestProvider::default());

    let mut request = references_request(42, "abc", "a.ts", Position::new(0, 0));
    request.cursor = Some(ReferenceCursor {
        dump_id: DumpId::new(999),
        scheme: "npm".to_owned(),
        identifier: "util/x".to_owned(),
        name: "util".to_owned(),
        version: None,
        phase: CursorPhase::SameRepo,
        offset: 0,
    });
    let page = backend.references(&RequestContext::new(), request).await.unwrap();

    assert!(page.locations.is_empty());
    assert!(page.cursor.is_none());
}

/// Pages of dumps that contribute no locations are skipped rather than
/// returned to the client.
#[tokio::test]
async fn empty_pages_are_skipped() {
    let d1 = dump(1, 42, "abc", "");
    let d4 = dump(4, 42, "def", "");
    let d5 = dump(5, 42, "ghi", "");

    let metadata = MockMetadata::default()
        .with_same_repo_page(0, page(std::slice::from_ref(&d4), 2, 1))
        .with_same_repo_page(1, page(std::slice::from_ref(&d5), 2, 2));
    metadata.register(d1.clone());

    let backend = backend(
        metadata,
        TestProvider::default()
            .with_store(&d4.filename, reference_rows(&[], "npm", "util/x"))
            .with_store(&d5.filename, reference_rows(&[("e.ts", 2)], "npm", "util/x")),
    );

    let mut request = references_request(42, "abc", "a.ts", Position::new(0, 0));
    request.cursor = Some(ReferenceCursor {
        dump_id: DumpId::new(1),
        scheme: "npm".to_owned(),
        identifier: "util/x".to_owned(),
        name: "util".to_owned(),
        version: Some("1.0.0".to_owned()),
        phase: CursorPhase::SameRepo,
        offset: 0,
    });
    let page = backend.references(&RequestContext::new(), request).await.unwrap();

    let paths: Vec<&str> = page.locations.iter().map(|l| l.path.as_str()).collect();
    assert_eq!(paths, vec!["e.ts"], "the empty first page was skipped");
    assert!(page.cursor.is_none());
}

/// A store that cancels the request's token and then fails, simulating a
/// caller-side cancellation racing the fan-out.
struct CancellingStore {
    token: tokio_util::sync::CancellationToken,
}

impl DumpStore for CancellingStore {
    fn contains_document<'a>(&'a self, _path: &'a str) -> BoxFuture<'a, Result<bool, StoreError>> {
        async move {
            self.token.cancel();
            Err(StoreError::Unavailable {
                message: "request aborted".to_owned(),
            })
        }
        .boxed()
    }

    fn document<'a>(
        &'a self,
        _path: &'a str,
    ) -> BoxFuture<'a, Result<Option<DocumentData>, StoreError>> {
        async move { Ok(None) }.boxed()
    }

    fn result_chunk_count(&self) -> BoxFuture<'_, Result<u64, StoreError>> {
        async move { Ok(0) }.boxed()
    }

    fn result_chunk(
        &self,
        _index: u64,
    ) -> BoxFuture<'_, Result<Option<ResultChunkData>, StoreError>> {
        async move { Ok(None) }.boxed()
    }

    fn moniker_rows<'a>(
        &'a self,
        _model: Model,
        _scheme: &'a str,
        _identifier: &'a str,
        _pagination: Pagination,
    ) -> BoxFuture<'a, Result<(Vec<MonikerRow>, u64), StoreError>> {
        async move { Ok((Vec::new(), 0)) }.boxed()
    }
}

/// Cancellation observed during the closest-dump fan-out beats the store
/// error it raced with, and no partial locations survive.
#[tokio::test]
async fn cancellation_wins_over_concurrent_store_errors() {
    let token = tokio_util::sync::CancellationToken::new();
    let ctx = RequestContext::with_token(token.clone());

    let d1 = dump(1, 42, "abc", "");
    let d2 = dump(2, 42, "abc", "");
    let healthy = FakeStoreBuilder::new()
        .document(
            "a.ts",
            DocumentBuilder::new()
                .range(1, range_data(range(0, 0, 0, 4), None, None, None, &[]))
                .build(),
        )
        .build();

    let backend = backend(
        MockMetadata::default().with_closest(&[d1.clone(), d2.clone()]),
        TestProvider::default()
            .with_store(&d1.filename, healthy)
            .with_store(&d2.filename, CancellingStore { token }),
    );

    let err = backend
        .references(&ctx, references_request(42, "abc", "a.ts", Position::new(0, 0)))
        .await
        .unwrap_err();
    assert!(err.is_cancelled(), "got {err:?}");
    assert!(!matches!(err, QueryError::Dump(_)), "store error must not win");
}
