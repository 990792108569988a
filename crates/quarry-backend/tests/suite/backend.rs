//! Definitions, hover and closest-dump selection.

use quarry_backend::QueryError;
use quarry_core::{DumpId, MonikerKind, Position, RepoId, RequestContext};
use quarry_dump::test_support::{dump, range_data, DocumentBuilder, FakeStoreBuilder};
use quarry_dump::{Model, MonikerRow};

use crate::{backend, range, MockMetadata, TestProvider};

/// One dump rooted at `src/`; the local definition wins.
#[tokio::test]
async fn definitions_resolve_locally() {
    let d1 = dump(1, 42, "abc", "src/");
    let document = DocumentBuilder::new()
        .range(1, range_data(range(10, 0, 10, 7), Some(11), None, None, &[]))
        .build();
    let store = FakeStoreBuilder::new()
        .document("a.ts", document)
        .result(11, &[("a.ts", 1)])
        .build();

    let backend = backend(
        MockMetadata::default().with_closest(std::slice::from_ref(&d1)),
        TestProvider::default().with_store(&d1.filename, store),
    );
    let ctx = RequestContext::new();

    let locations = backend
        .definitions(&ctx, RepoId::new(42), "abc", "src/a.ts", Position::new(10, 4), None)
        .await
        .unwrap();
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].dump.id, DumpId::new(1));
    assert_eq!(locations[0].path, "src/a.ts");
    assert_eq!(locations[0].range, range(10, 0, 10, 7));
}

/// No local definition; an import moniker resolves through package metadata
/// into the package's own dump.
#[tokio::test]
async fn definitions_follow_import_monikers_into_the_package_dump() {
    let d1 = dump(1, 42, "abc", "src/");
    let document = DocumentBuilder::new()
        .range(1, range_data(range(3, 8, 3, 16), None, None, None, &[1]))
        .moniker(
            1,
            quarry_core::Moniker {
                kind: MonikerKind::Import,
                scheme: "npm".to_owned(),
                identifier: "lodash/padStart".to_owned(),
                package_information_id: Some(quarry_core::PackageInformationId::new(5)),
            },
        )
        .package_information(5, "lodash", Some("4.17.0"))
        .build();
    let local_store = FakeStoreBuilder::new().document("a.ts", document).build();

    let package_dump = dump(2, 99, "eee", "");
    let package_store = FakeStoreBuilder::new()
        .moniker_row(
            Model::Definition,
            MonikerRow {
                scheme: "npm".to_owned(),
                identifier: "lodash/padStart".to_owned(),
                path: "padStart.js".to_owned(),
                range: range(1, 0, 1, 8),
            },
        )
        .build();

    let backend = backend(
        MockMetadata::default()
            .with_closest(std::slice::from_ref(&d1))
            .with_package("npm", "lodash", Some("4.17.0"), package_dump.clone()),
        TestProvider::default()
            .with_store(&d1.filename, local_store)
            .with_store(&package_dump.filename, package_store),
    );
    let ctx = RequestContext::new();

    let locations = backend
        .definitions(&ctx, RepoId::new(42), "abc", "src/a.ts", Position::new(3, 10), None)
        .await
        .unwrap();
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].dump.id, DumpId::new(2));
    assert_eq!(locations[0].path, "padStart.js");
}

#[tokio::test]
async fn an_unindexed_file_is_no_dump_found() {
    let backend = backend(MockMetadata::default(), TestProvider::default());
    let err = backend
        .definitions(
            &RequestContext::new(),
            RepoId::new(42),
            "abc",
            "src/a.ts",
            Position::new(0, 0),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::NoDumpFound { .. }), "got {err:?}");
}

#[tokio::test]
async fn an_indexed_file_without_results_is_an_empty_answer() {
    let d1 = dump(1, 42, "abc", "");
    let document = DocumentBuilder::new()
        .range(1, range_data(range(0, 0, 0, 4), None, None, None, &[]))
        .build();
    let store = FakeStoreBuilder::new().document("a.ts", document).build();

    let backend = backend(
        MockMetadata::default().with_closest(std::slice::from_ref(&d1)),
        TestProvider::default().with_store(&d1.filename, store),
    );
    let locations = backend
        .definitions(
            &RequestContext::new(),
            RepoId::new(42),
            "abc",
            "a.ts",
            Position::new(0, 1),
            None,
        )
        .await
        .unwrap();
    assert!(locations.is_empty());
}

#[tokio::test]
async fn exists_filters_without_reordering() {
    let with_file = |id| {
        FakeStoreBuilder::new()
            .document(
                "a.ts",
                DocumentBuilder::new()
                    .range(id, range_data(range(0, 0, 0, 1), None, None, None, &[]))
                    .build(),
            )
            .build()
    };
    let d1 = dump(1, 42, "aaa", "");
    let d2 = dump(2, 42, "bbb", "");
    let d3 = dump(3, 42, "ccc", "");

    let backend = backend(
        MockMetadata::default().with_closest(&[d1.clone(), d2.clone(), d3.clone()]),
        TestProvider::default()
            .with_store(&d1.filename, with_file(1))
            .with_store(&d2.filename, FakeStoreBuilder::new().build())
            .with_store(&d3.filename, with_file(3)),
    );

    let dumps = backend
        .exists(&RequestContext::new(), RepoId::new(42), "aaa", "a.ts")
        .await
        .unwrap();
    let ids: Vec<u64> = dumps.iter().map(|d| d.id.to_raw()).collect();
    assert_eq!(ids, vec![1, 3], "metadata order survives the filter");
}

#[tokio::test]
async fn dumps_whose_root_excludes_the_path_are_skipped() {
    let d1 = dump(1, 42, "aaa", "client/");
    let backend = backend(
        MockMetadata::default().with_closest(std::slice::from_ref(&d1)),
        TestProvider::default(),
    );
    let dumps = backend
        .exists(&RequestContext::new(), RepoId::new(42), "aaa", "server/app.ts")
        .await
        .unwrap();
    assert!(dumps.is_empty());
}

#[tokio::test]
async fn hover_prefers_the_local_dump() {
    let d1 = dump(1, 42, "abc", "");
    let document = DocumentBuilder::new()
        .range(1, range_data(range(2, 0, 2, 5), None, None, Some(9), &[]))
        .hover(9, "local docs")
        .build();
    let store = FakeStoreBuilder::new().document("a.ts", document).build();

    let backend = backend(
        MockMetadata::default().with_closest(std::slice::from_ref(&d1)),
        TestProvider::default().with_store(&d1.filename, store),
    );
    let hover = backend
        .hover(
            &RequestContext::new(),
            RepoId::new(42),
            "abc",
            "a.ts",
            Position::new(2, 2),
            None,
        )
        .await
        .unwrap()
        .expect("hover present");
    assert_eq!(hover.text, "local docs");
    assert_eq!(hover.range, range(2, 0, 2, 5));
}

/// The local indexer recorded a moniker but no hover text; the definition's
/// home dump supplies it.
#[tokio::test]
async fn hover_falls_back_to_the_defining_dump() {
    let d1 = dump(1, 42, "abc", "");
    let document = DocumentBuilder::new()
        .range(1, range_data(range(3, 8, 3, 16), None, None, None, &[1]))
        .moniker(
            1,
            quarry_core::Moniker {
                kind: MonikerKind::Import,
                scheme: "npm".to_owned(),
                identifier: "lodash/padStart".to_owned(),
                package_information_id: Some(quarry_core::PackageInformationId::new(5)),
            },
        )
        .package_information(5, "lodash", Some("4.17.0"))
        .build();
    let local_store = FakeStoreBuilder::new().document("a.ts", document).build();

    let package_dump = dump(2, 99, "eee", "");
    let package_document = DocumentBuilder::new()
        .range(7, range_data(range(1, 0, 1, 8), None, None, Some(3), &[]))
        .hover(3, "padStart(value, length)")
        .build();
    let package_store = FakeStoreBuilder::new()
        .document("padStart.js", package_document)
        .moniker_row(
            Model::Definition,
            MonikerRow {
                scheme: "npm".to_owned(),
                identifier: "lodash/padStart".to_owned(),
                path: "padStart.js".to_owned(),
                range: range(1, 0, 1, 8),
            },
        )
        .build();

    let backend = backend(
        MockMetadata::default()
            .with_closest(std::slice::from_ref(&d1))
            .with_package("npm", "lodash", Some("4.17.0"), package_dump.clone()),
        TestProvider::default()
            .with_store(&d1.filename, local_store)
            .with_store(&package_dump.filename, package_store),
    );

    let hover = backend
        .hover(
            &RequestContext::new(),
            RepoId::new(42),
            "abc",
            "a.ts",
            Position::new(3, 10),
            None,
        )
        .await
        .unwrap()
        .expect("hover from the package dump");
    assert_eq!(hover.text, "padStart(value, length)");
}

#[tokio::test]
async fn hover_is_null_when_nobody_recorded_it() {
    let d1 = dump(1, 42, "abc", "");
    let document = DocumentBuilder::new()
        .range(1, range_data(range(0, 0, 0, 4), None, None, None, &[]))
        .build();
    let store = FakeStoreBuilder::new().document("a.ts", document).build();

    let backend = backend(
        MockMetadata::default().with_closest(std::slice::from_ref(&d1)),
        TestProvider::default().with_store(&d1.filename, store),
    );
    let hover = backend
        .hover(
            &RequestContext::new(),
            RepoId::new(42),
            "abc",
            "a.ts",
            Position::new(0, 1),
            None,
        )
        .await
        .unwrap();
    assert!(hover.is_none());
}
