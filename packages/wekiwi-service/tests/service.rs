use std::sync::Arc;

use wekiwi_batch::{BatchScheduler, Operation, SchedulerConfig};
use wekiwi_config::Config;
use wekiwi_ranking::OrphanPolicy;
use wekiwi_service::{
	ContentInput, CreateContentRequest, EmbedRequest, Error, Models, RebuildReport, RerankContent,
	RerankRequest, SearchFilter, SearchRequest, UpdateContentRequest, WekiwiService,
};
use wekiwi_storage::{
	filter::{ContentFilter, TimeRange},
	models::{ChunkMeta, ChunkPayload, IndexSource},
};
use wekiwi_testkit::{FakeModel, MemoryContentStore, MemoryIndex, fake_embedding, test_config};

const COMPANY: u32 = 1;
const OTHER_COMPANY: u32 = 2;
const CIRCLE: u32 = 10;

struct Harness {
	service: WekiwiService,
	index: Arc<MemoryIndex>,
	embedder: Arc<FakeModel>,
	reranker: Arc<FakeModel>,
}

fn harness(cfg: Config, with_reranker: bool) -> Harness {
	let index = MemoryIndex::new(cfg.providers.embedding.dimensions);
	let contents = MemoryContentStore::new();

	// Folder 1 holds documents 2 and 3; document 4 stands alone.
	contents.insert(COMPANY, 1, None, "Finance");
	contents.insert(COMPANY, 2, Some(1), "Quarterly report");
	contents.insert(COMPANY, 3, Some(1), "Holiday plan");
	contents.insert(COMPANY, 4, None, "Sales");
	contents.insert(OTHER_COMPANY, 5, None, "Foreign report");

	index.insert(2, COMPANY, &[CIRCLE], "quarterly report revenue");
	index.insert(2, COMPANY, &[CIRCLE], "report appendix");
	index.insert(3, COMPANY, &[CIRCLE], "holiday plan summer");
	index.insert(4, COMPANY, &[CIRCLE], "quarterly sales");
	index.insert(5, OTHER_COMPANY, &[CIRCLE], "quarterly report");

	harness_with(cfg, with_reranker, index, contents)
}

fn harness_with(
	cfg: Config,
	with_reranker: bool,
	index: MemoryIndex,
	contents: MemoryContentStore,
) -> Harness {
	let scheduler_cfg = SchedulerConfig::from_config(&cfg.batching);
	let embedder = FakeModel::embedder(cfg.providers.embedding.dimensions);
	let reranker = FakeModel::reranker();
	let embedding = BatchScheduler::start(Arc::clone(&embedder), &scheduler_cfg)
		.expect("Failed to start embedding scheduler.");
	let rerank = with_reranker.then(|| {
		Arc::new(
			BatchScheduler::start(Arc::clone(&reranker), &scheduler_cfg)
				.expect("Failed to start rerank scheduler."),
		)
	});
	let models = Models { embedding: Arc::new(embedding), rerank };
	let index = Arc::new(index);
	let service = WekiwiService::new(cfg, models, index.clone(), Arc::new(contents));

	Harness { service, index, embedder, reranker }
}

fn search_request(query: &str) -> SearchRequest {
	SearchRequest {
		query: query.to_string(),
		company_id: COMPANY,
		circle_ids: vec![CIRCLE],
		rerank: true,
		offset: None,
		page_size: None,
		k_avg: None,
		filter: None,
	}
}

fn content(content_id: u32, title: &str, text: Option<&str>) -> ContentInput {
	ContentInput {
		content_id,
		text: text.map(str::to_string),
		meta: ChunkMeta {
			title: Some(title.to_string()),
			content_type: Some("text".to_string()),
			..ChunkMeta::default()
		},
	}
}

fn source(
	content_id: u32,
	company_id: Option<u32>,
	title: Option<&str>,
	text: &str,
) -> IndexSource {
	IndexSource {
		content_id,
		company_id,
		text: Some(text.to_string()),
		circle_ids: vec![CIRCLE],
		meta: ChunkMeta {
			title: title.map(str::to_string),
			content_type: Some("text".to_string()),
			..ChunkMeta::default()
		},
	}
}

fn approx(actual: Option<f32>, expected: f32) -> bool {
	actual.is_some_and(|actual| (actual - expected).abs() < 1e-6)
}

#[tokio::test]
async fn reranked_search_builds_a_ranked_forest() {
	let Harness { service, reranker, .. } = harness(test_config(), true);
	let forest =
		service.search(search_request("quarterly report")).await.expect("Search failed.");

	// Document 4 scores 0.5 on its own; folder 1 averages 0.75 and 0.0.
	assert_eq!(forest.iter().map(|node| node.id).collect::<Vec<_>>(), vec![4, 1]);

	let sales = &forest[0];
	let folder = &forest[1];

	assert!(approx(sales.score, 0.5));
	assert!(approx(sales.avg_leaf_score, 0.5));
	assert_eq!(folder.score, None);
	assert!(approx(folder.avg_leaf_score, 0.375));
	assert_eq!(folder.children.iter().map(|node| node.id).collect::<Vec<_>>(), vec![2, 3]);
	assert!(approx(folder.children[0].score, 0.75));
	assert_eq!(folder.children[0].meta.title.as_deref(), Some("Quarterly report"));
	assert_eq!(reranker.batches(Operation::Rerank).iter().sum::<usize>(), 4);
}

#[tokio::test]
async fn plain_search_uses_index_scores_and_skips_the_reranker() {
	let Harness { service, embedder, reranker, .. } = harness(test_config(), true);
	let mut req = search_request("quarterly report");

	req.rerank = false;

	let forest = service.search(req).await.expect("Search failed.");
	let mut root_ids = forest.iter().map(|node| node.id).collect::<Vec<_>>();

	root_ids.sort_unstable();

	assert_eq!(root_ids, vec![1, 4]);
	assert!(reranker.batches(Operation::Rerank).is_empty());
	assert_eq!(embedder.batches(Operation::Embed), vec![1]);
}

#[tokio::test]
async fn empty_circles_short_circuit_before_embedding() {
	let Harness { service, embedder, .. } = harness(test_config(), true);
	let mut req = search_request("quarterly report");

	req.circle_ids.clear();

	assert!(service.search(req).await.expect("Search failed.").is_empty());
	assert!(embedder.batches(Operation::Embed).is_empty());
}

#[tokio::test]
async fn search_without_hits_returns_nothing() {
	let Harness { service, .. } = harness(test_config(), true);
	let mut req = search_request("quarterly report");

	req.company_id = 99;

	assert!(service.search(req).await.expect("Search failed.").is_empty());
}

#[tokio::test]
async fn rerank_without_a_reranker_is_an_invalid_request() {
	let Harness { service, .. } = harness(test_config(), false);
	let err = service
		.search(search_request("quarterly report"))
		.await
		.expect_err("Expected missing reranker to fail.");

	assert!(matches!(err, Error::InvalidRequest { .. }), "Unexpected error: {err}");
}

#[tokio::test]
async fn search_requests_are_validated() {
	let Harness { service, .. } = harness(test_config(), true);
	let too_long = "q".repeat(service.cfg.search.max_query_chars + 1);
	let mut zero_page = search_request("report");

	zero_page.page_size = Some(0);

	let mut zero_k = search_request("report");

	zero_k.k_avg = Some(0);

	for req in [search_request("   "), search_request(&too_long), zero_page, zero_k] {
		let err = service.search(req).await.expect_err("Expected validation error.");

		assert!(matches!(err, Error::InvalidRequest { .. }), "Unexpected error: {err}");
	}
}

#[tokio::test]
async fn dangling_parents_follow_the_orphan_policy() {
	let build = |policy: OrphanPolicy| {
		let mut cfg = test_config();
		let index = MemoryIndex::new(cfg.providers.embedding.dimensions);
		let contents = MemoryContentStore::new();

		cfg.search.orphan_policy = policy;

		contents.insert(COMPANY, 7, Some(70), "Detached note");
		index.insert(7, COMPANY, &[CIRCLE], "detached note");

		harness_with(cfg, true, index, contents).service
	};
	let err = build(OrphanPolicy::Reject)
		.search(search_request("detached note"))
		.await
		.expect_err("Expected dangling parent to fail.");

	assert!(matches!(err, Error::Ranking { .. }), "Unexpected error: {err}");

	let forest = build(OrphanPolicy::Promote)
		.search(search_request("detached note"))
		.await
		.expect("Search failed.");

	assert_eq!(forest.len(), 1);
	assert_eq!(forest[0].id, 7);
	assert_eq!(forest[0].parent_id, Some(70));
}

#[tokio::test]
async fn long_texts_are_reranked_window_by_window() {
	let mut cfg = test_config();

	cfg.search.rerank_max_chars = 40;
	cfg.search.rerank_chunk_chars = 20;
	cfg.search.rerank_overlap_chars = 5;

	let Harness { service, reranker, .. } = harness(cfg, true);
	let long_text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda";
	let response = service
		.rerank(RerankRequest {
			query: "alpha".to_string(),
			contents: vec![
				RerankContent { content_id: 11, text: "alpha".to_string() },
				RerankContent { content_id: 12, text: long_text.to_string() },
			],
		})
		.await
		.expect("Rerank failed.");

	let ids = response.result.iter().map(|item| item.content_id).collect::<Vec<_>>();

	assert_eq!(ids, vec![11, 12]);
	assert!(approx(Some(response.result[0].score), 1.0));
	assert!(response.result[1].score > 0.0 && response.result[1].score < 1.0);
	assert_eq!(response.result[1].text, long_text);
	assert!(reranker.batches(Operation::Rerank).iter().sum::<usize>() >= 4);
}

#[tokio::test]
async fn embed_returns_one_vector_per_text() {
	let Harness { service, embedder, .. } = harness(test_config(), false);
	let dims = service.cfg.providers.embedding.dimensions as usize;
	let texts = vec!["first".to_string(), "second".to_string(), "third".to_string()];
	let response =
		service.embed(EmbedRequest { texts: texts.clone() }).await.expect("Embed failed.");

	assert_eq!(response.embeddings.len(), texts.len());

	for (text, embedding) in texts.iter().zip(&response.embeddings) {
		assert_eq!(embedding, &fake_embedding(text, dims));
	}

	assert_eq!(embedder.batches(Operation::Embed).iter().sum::<usize>(), 3);

	let err = service
		.embed(EmbedRequest { texts: Vec::new() })
		.await
		.expect_err("Expected empty input to fail.");

	assert!(matches!(err, Error::InvalidRequest { .. }), "Unexpected error: {err}");
}

#[tokio::test]
async fn deep_hierarchies_resolve_to_their_top_ancestor() {
	let cfg = test_config();
	let index = MemoryIndex::new(cfg.providers.embedding.dimensions);
	let contents = MemoryContentStore::new();

	contents.insert(COMPANY, 1, None, "Company wiki");
	contents.insert(COMPANY, 2, Some(1), "Departments");
	contents.insert(COMPANY, 3, Some(2), "Finance");
	contents.insert(COMPANY, 4, Some(3), "Audit checklist");
	index.insert(4, COMPANY, &[CIRCLE], "audit checklist");

	let Harness { service, .. } = harness_with(cfg, true, index, contents);
	let forest = service.search(search_request("audit checklist")).await.expect("Search failed.");

	assert_eq!(forest.len(), 1);
	assert_eq!(forest[0].id, 1);

	let departments = &forest[0].children[0];
	let finance = &departments.children[0];

	assert_eq!(departments.id, 2);
	assert_eq!(finance.id, 3);
	assert_eq!(finance.children.iter().map(|node| node.id).collect::<Vec<_>>(), vec![4]);
	assert!(approx(finance.children[0].score, 1.0));
}

#[tokio::test]
async fn filters_restrict_hits_by_metadata() {
	let cfg = test_config();
	let index = MemoryIndex::new(cfg.providers.embedding.dimensions);
	let contents = MemoryContentStore::new();
	let chunk = |content_id: u32, content_type: &str, date_created: i64| ChunkPayload {
		content_id,
		company_id: COMPANY,
		circle_ids: vec![CIRCLE],
		text: "travel policy".to_string(),
		meta: ChunkMeta {
			content_type: Some(content_type.to_string()),
			date_created: Some(date_created),
			..ChunkMeta::default()
		},
	};

	contents.insert(COMPANY, 20, None, "Policy text");
	contents.insert(COMPANY, 21, None, "Policy scan");
	contents.insert(COMPANY, 22, None, "Old policy");
	index.insert_payload(chunk(20, "text", 1_700_000_500));
	index.insert_payload(chunk(21, "file", 1_700_000_500));
	index.insert_payload(chunk(22, "text", 1_600_000_000));

	let Harness { service, .. } = harness_with(cfg, false, index, contents);
	let filtered = |filter: SearchFilter| {
		let mut req = search_request("travel policy");

		req.rerank = false;
		req.filter = Some(filter);

		req
	};
	let mut ids = service
		.search(filtered(SearchFilter::Expression("content_type == 'text'".to_string())))
		.await
		.expect("Search failed.")
		.iter()
		.map(|node| node.id)
		.collect::<Vec<_>>();

	ids.sort_unstable();

	assert_eq!(ids, vec![20, 22]);

	let recent = ContentFilter {
		content_type: Some("text".to_string()),
		date_created: Some(TimeRange { gte: Some(1_700_000_000), ..TimeRange::default() }),
		..ContentFilter::default()
	};
	let forest =
		service.search(filtered(SearchFilter::Fields(recent))).await.expect("Search failed.");

	assert_eq!(forest.iter().map(|node| node.id).collect::<Vec<_>>(), vec![20]);
}

#[tokio::test]
async fn unsupported_filters_are_rejected_before_embedding() {
	let Harness { service, embedder, .. } = harness(test_config(), true);
	let mut req = search_request("quarterly report");

	req.filter = Some(SearchFilter::Expression("folder_id == 3".to_string()));

	let err = service.search(req).await.expect_err("Expected unsupported filter to fail.");

	assert!(matches!(err, Error::InvalidRequest { .. }), "Unexpected error: {err}");
	assert!(embedder.batches(Operation::Embed).is_empty());
}

#[tokio::test]
async fn created_contents_are_chunked_embedded_and_searchable() {
	let mut cfg = test_config();

	cfg.indexing.chunk_chars = 24;
	cfg.indexing.overlap_chars = 6;

	let Harness { service, index, .. } =
		harness_with(cfg, false, MemoryIndex::new(64), MemoryContentStore::new());
	let html = "<h1>Onboarding</h1><p>Laptops ship on day one &amp; accounts open on day two.</p>";
	let message = service
		.create_content(CreateContentRequest {
			content: content(30, "Onboarding guide", Some(html)),
			company_id: COMPANY,
			circle_ids: vec![CIRCLE],
		})
		.await
		.expect("Create failed.");
	let chunks = index.chunks(30);

	assert!(chunks.len() > 1, "{chunks:?}");
	assert_eq!(message.message, format!("Indexed content 30 in {} chunks.", chunks.len()));
	assert!(chunks.iter().all(|chunk| chunk.text.chars().count() <= 24));
	assert!(chunks.iter().all(|chunk| !chunk.text.contains('<')));
	assert!(chunks.iter().any(|chunk| chunk.text.contains('&')));
	assert!(chunks.iter().all(|chunk| chunk.meta.title.as_deref() == Some("Onboarding guide")));
	assert!(chunks.iter().all(|chunk| chunk.circle_ids == vec![CIRCLE]));

	service
		.create_content(CreateContentRequest {
			content: content(30, "Onboarding guide", Some("Short again.")),
			company_id: COMPANY,
			circle_ids: vec![CIRCLE],
		})
		.await
		.expect("Create failed.");

	assert_eq!(index.chunks(30).len(), 1);
}

#[tokio::test]
async fn contents_without_text_index_their_title() {
	let Harness { service, index, .. } =
		harness_with(test_config(), false, MemoryIndex::new(64), MemoryContentStore::new());

	service
		.create_content(CreateContentRequest {
			content: content(31, "Team photos", None),
			company_id: COMPANY,
			circle_ids: vec![CIRCLE],
		})
		.await
		.expect("Create failed.");

	let chunks = index.chunks(31);

	assert_eq!(chunks.len(), 1);
	assert_eq!(chunks[0].text, "Team photos");

	let mut empty = content(32, "  ", Some("<p> </p>"));

	empty.meta.title = None;

	let err = service
		.create_content(CreateContentRequest {
			content: empty,
			company_id: COMPANY,
			circle_ids: vec![CIRCLE],
		})
		.await
		.expect_err("Expected empty content to fail.");

	assert!(matches!(err, Error::InvalidRequest { .. }), "Unexpected error: {err}");
	assert!(index.chunks(32).is_empty());
}

#[tokio::test]
async fn updates_patch_metadata_or_reindex_new_text() {
	let Harness { service, index, .. } = harness(test_config(), false);
	let err = service
		.update_content(UpdateContentRequest {
			content: content(404, "Missing", None),
			company_id: None,
			circle_ids: None,
		})
		.await
		.expect_err("Expected unknown content to fail.");

	assert!(matches!(err, Error::NotFound { .. }), "Unexpected error: {err}");

	let mut renamed = content(2, "Q3 report", None);

	renamed.meta.content_type = None;

	service
		.update_content(UpdateContentRequest {
			content: renamed,
			company_id: None,
			circle_ids: Some(vec![CIRCLE, 11]),
		})
		.await
		.expect("Update failed.");

	let chunks = index.chunks(2);

	assert_eq!(chunks.len(), 2);
	assert!(chunks.iter().all(|chunk| chunk.meta.title.as_deref() == Some("Q3 report")));
	assert!(chunks.iter().all(|chunk| chunk.circle_ids == vec![CIRCLE, 11]));
	assert_eq!(chunks[0].text, "quarterly report revenue");
	assert_eq!(chunks[0].company_id, COMPANY);

	service
		.update_content(UpdateContentRequest {
			content: content(2, "Q3 report", Some("<p>Revised figures</p>")),
			company_id: None,
			circle_ids: None,
		})
		.await
		.expect("Update failed.");

	let chunks = index.chunks(2);

	assert_eq!(chunks.len(), 1);
	assert_eq!(chunks[0].text, "Revised figures");
	assert_eq!(chunks[0].circle_ids, vec![CIRCLE, 11]);
	assert_eq!(chunks[0].meta.content_type.as_deref(), Some("text"));
}

#[tokio::test]
async fn deletes_report_the_number_of_removed_chunks() {
	let Harness { service, index, .. } = harness(test_config(), false);
	let message = service.delete_contents(&[2, 3, 404]).await.expect("Delete failed.");

	assert_eq!(message.message, "Deleted 3 entities.");
	assert!(index.chunks(2).is_empty());
	assert!(index.chunks(3).is_empty());
	assert_eq!(index.chunks(4).len(), 1);

	let err = service.delete_contents(&[]).await.expect_err("Expected empty ids to fail.");

	assert!(matches!(err, Error::InvalidRequest { .. }), "Unexpected error: {err}");
}

#[tokio::test]
async fn rebuild_replaces_the_index_from_the_content_store() {
	let mut cfg = test_config();

	cfg.indexing.rebuild_page_size = 2;

	let index = MemoryIndex::new(cfg.providers.embedding.dimensions);
	let contents = MemoryContentStore::new();

	index.insert(99, COMPANY, &[CIRCLE], "stale chunk");
	contents.insert_source(source(3, Some(COMPANY), Some("Holidays"), "<p>Summer plan</p>"));
	contents.insert_source(source(1, Some(COMPANY), Some("Finance"), "Budget"));
	contents.insert_source(source(2, None, Some("Orphaned"), "No company"));
	contents.insert_source(source(4, Some(COMPANY), None, " "));
	contents.insert_source(source(5, Some(COMPANY), Some("Title only"), ""));

	let Harness { service, index, .. } = harness_with(cfg, false, index, contents);
	let report = service.rebuild().await.expect("Rebuild failed.");

	assert_eq!(report, RebuildReport { contents: 4, chunks: 4, skipped: 1, failed: 0 });
	assert!(index.chunks(99).is_empty());
	assert_eq!(index.len(), 4);
	assert_eq!(index.chunks(2)[0].company_id, 0);
	assert_eq!(index.chunks(3)[0].text, "Summer plan");
	assert_eq!(index.chunks(5)[0].text, "Title only");
}
