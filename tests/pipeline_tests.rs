//! End-to-end pipeline tests against the mock query service
//!
//! Covers the pipeline's load-bearing properties:
//! - identical requests execute exactly once and share one result
//! - per-element failures annotate and never abort the batch
//! - meta elements feed consumers and are stripped from the output
//! - the run-level filter reaches the executed query body

use std::io::Cursor;

use serde_json::json;

use lookdeck::document::{
    ChartFrame, Content, Deck, Element, Frame, ImageFrame, Paragraph, Run, RunFont, Slide,
    TableGrid, TextFrame,
};
use lookdeck::{
    collect_bound_elements, run_pipeline, Look, MockQueryService, RawResult, RenderOutcome,
    RunOptions, WriteQuery,
};

// ============================================================================
// TEST HELPERS
// ============================================================================

fn look(id: &str, view: &str) -> Look {
    let mut filters = std::collections::BTreeMap::new();
    filters.insert("orders.region".to_string(), "EMEA".to_string());
    Look {
        id: id.to_string(),
        title: None,
        query: WriteQuery {
            model: "ecommerce".to_string(),
            view: view.to_string(),
            fields: Some(vec!["orders.date".into(), "orders.count".into()]),
            filters: Some(filters),
            ..WriteQuery::default()
        },
    }
}

fn orders_payload() -> serde_json::Value {
    json!({
        "metadata": {"fields": {
            "dimensions": [{"name": "orders.date", "label": "Date"}],
            "measures": [{"name": "orders.count", "label": "Orders Count"}]
        }},
        "rows": [
            {"orders.date": {"value": "jan"}, "orders.count": {"value": 17}},
            {"orders.date": {"value": "feb"}, "orders.count": {"value": 21}}
        ]
    })
}

fn text_element(id: u32, binding: &str) -> Element {
    Element {
        id,
        name: format!("text-{id}"),
        binding: Some(binding.to_string()),
        frame: Frame {
            left: 10.0,
            top: 10.0,
            width: 200.0,
            height: 50.0,
        },
        content: Content::Text(TextFrame {
            paragraphs: vec![Paragraph {
                alignment: None,
                runs: vec![Run {
                    text: "placeholder".to_string(),
                    font: RunFont::default(),
                }],
            }],
        }),
    }
}

fn chart_element(id: u32, binding: &str) -> Element {
    Element {
        id,
        name: format!("chart-{id}"),
        binding: Some(binding.to_string()),
        frame: Frame {
            left: 0.0,
            top: 0.0,
            width: 300.0,
            height: 200.0,
        },
        content: Content::Chart(ChartFrame::default()),
    }
}

fn element_text(deck: &Deck, slide: usize, id: u32) -> String {
    match &deck.element(slide, id).unwrap().content {
        Content::Text(frame) => frame.full_text(),
        other => panic!("expected text element, got {other:?}"),
    }
}

fn marker_count(deck: &Deck, slide: usize) -> usize {
    deck.slides[slide]
        .elements
        .iter()
        .filter(|e| e.name == "lookdeck-error")
        .count()
}

// ============================================================================
// DEDUPLICATION
// ============================================================================

#[tokio::test]
async fn identical_bindings_fetch_once_and_share_output() {
    // Three TEXT elements on look 42, one on look 99: exactly two fetches.
    let mut deck = Deck {
        slides: vec![
            Slide {
                elements: vec![
                    text_element(1, "id: '42'\nlabel: orders count"),
                    text_element(2, "id: '42'\nlabel: orders count"),
                ],
            },
            Slide {
                elements: vec![
                    text_element(1, "id: '42'\nlabel: orders count"),
                    text_element(2, "id: '99'"),
                ],
            },
        ],
    };

    let service = MockQueryService::new()
        .with_look(look("42", "orders"))
        .with_look(look("99", "users"))
        .with_result("orders", RawResult::Tabular(orders_payload()))
        .with_result(
            "users",
            RawResult::Tabular(json!({"rows": [{"users.count": {"value": 5}}]})),
        );

    let report = run_pipeline(&mut deck, &service, &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(service.run_calls(), 2);
    assert_eq!(report.distinct_queries, 2);
    assert_eq!(report.bound_elements, 4);
    assert_eq!(report.rendered(), 4);

    // All three members of the "42" group render identical output.
    let a = element_text(&deck, 0, 1);
    let b = element_text(&deck, 0, 2);
    let c = element_text(&deck, 1, 1);
    assert_eq!(a, "17");
    assert_eq!(a, b);
    assert_eq!(b, c);
    assert_eq!(element_text(&deck, 1, 2), "5");
}

#[tokio::test]
async fn differing_selectors_still_share_one_fetch() {
    let mut deck = Deck {
        slides: vec![Slide {
            elements: vec![
                text_element(1, "id: '42'\nlabel: orders count"),
                text_element(2, "id: '42'\nlabel: orders count\nrow: 1"),
            ],
        }],
    };

    let service = MockQueryService::new()
        .with_look(look("42", "orders"))
        .with_result("orders", RawResult::Tabular(orders_payload()));

    run_pipeline(&mut deck, &service, &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(service.run_calls(), 1);
    assert_eq!(element_text(&deck, 0, 1), "17");
    assert_eq!(element_text(&deck, 0, 2), "21");
}

// ============================================================================
// FAILURE ISOLATION
// ============================================================================

#[tokio::test]
async fn chart_render_failure_marks_element_and_batch_continues() {
    // The chart's result has a single column: a render error for the
    // chart, while the text element on the same deck renders normally.
    let mut deck = Deck {
        slides: vec![Slide {
            elements: vec![
                chart_element(1, "id: '7'"),
                text_element(2, "id: '42'\nlabel: orders count"),
            ],
        }],
    };

    let service = MockQueryService::new()
        .with_look(look("7", "lonely"))
        .with_look(look("42", "orders"))
        .with_result(
            "lonely",
            RawResult::Tabular(json!({"rows": [{"only.measure": {"value": 1}}]})),
        )
        .with_result("orders", RawResult::Tabular(orders_payload()));

    let report = run_pipeline(&mut deck, &service, &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(report.failed(), 1);
    assert_eq!(report.rendered(), 1);
    assert_eq!(marker_count(&deck, 0), 1);
    assert_eq!(element_text(&deck, 0, 2), "17");

    // The failure marker sits at the failed element's frame.
    let marker = deck.slides[0]
        .elements
        .iter()
        .find(|e| e.name == "lookdeck-error")
        .unwrap();
    assert_eq!(marker.frame, deck.element(0, 1).unwrap().frame);
}

#[tokio::test]
async fn hide_errors_suppresses_markers() {
    let mut deck = Deck {
        slides: vec![Slide {
            elements: vec![text_element(1, "id: 'missing'")],
        }],
    };
    let service = MockQueryService::new();

    let options = RunOptions {
        hide_errors: true,
        ..RunOptions::default()
    };
    let report = run_pipeline(&mut deck, &service, &options).await.unwrap();

    assert_eq!(report.failed(), 1);
    assert_eq!(marker_count(&deck, 0), 0);
}

#[tokio::test]
async fn execution_failure_nulls_only_its_group() {
    let mut deck = Deck {
        slides: vec![Slide {
            elements: vec![
                text_element(1, "id: '42'\nlabel: orders count"),
                text_element(2, "id: '99'"),
            ],
        }],
    };

    let service = MockQueryService::new()
        .with_look(look("42", "orders"))
        .with_look(look("99", "users"))
        .with_result("orders", RawResult::Tabular(orders_payload()))
        .with_result(
            "users",
            RawResult::Tabular(json!({"rows": [{"users.count": {"value": 5}}]})),
        )
        .with_failing_view("users");

    let report = run_pipeline(&mut deck, &service, &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(report.failed_queries, 1);
    assert_eq!(element_text(&deck, 0, 1), "17");
    assert!(matches!(
        report.outcomes[1].outcome,
        RenderOutcome::Failed(_)
    ));
    assert_eq!(marker_count(&deck, 0), 1);
}

#[tokio::test]
async fn unresolvable_look_fails_only_that_element() {
    let mut deck = Deck {
        slides: vec![Slide {
            elements: vec![
                text_element(1, "id: 'nope'"),
                text_element(2, "id: '42'\nlabel: orders count"),
            ],
        }],
    };

    let service = MockQueryService::new()
        .with_look(look("42", "orders"))
        .with_result("orders", RawResult::Tabular(orders_payload()));

    let report = run_pipeline(&mut deck, &service, &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(service.run_calls(), 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(element_text(&deck, 0, 2), "17");
}

// ============================================================================
// META ELEMENTS
// ============================================================================

#[tokio::test]
async fn meta_element_feeds_consumers_and_is_stripped() {
    let mut deck = Deck {
        slides: vec![Slide {
            elements: vec![
                text_element(1, "id: '42'\nmeta: true\nmeta_name: shared_orders"),
                text_element(
                    2,
                    "id: shared_orders\nid_type: meta\nlabel: orders count",
                ),
            ],
        }],
    };

    let service = MockQueryService::new()
        .with_look(look("42", "orders"))
        .with_result("orders", RawResult::Tabular(orders_payload()));

    let report = run_pipeline(&mut deck, &service, &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(service.run_calls(), 1);
    assert_eq!(element_text(&deck, 0, 2), "17");
    // the meta element is scaffolding and is removed from the output
    assert!(deck.element(0, 1).is_none());
    assert!(matches!(
        report.outcomes[0].outcome,
        RenderOutcome::Skipped(_)
    ));
}

#[tokio::test]
async fn write_in_place_keeps_meta_elements() {
    let mut deck = Deck {
        slides: vec![Slide {
            elements: vec![text_element(
                1,
                "id: '42'\nmeta: true\nmeta_name: shared_orders",
            )],
        }],
    };

    let service = MockQueryService::new()
        .with_look(look("42", "orders"))
        .with_result("orders", RawResult::Tabular(orders_payload()));

    let options = RunOptions {
        write_in_place: true,
        ..RunOptions::default()
    };
    run_pipeline(&mut deck, &service, &options).await.unwrap();

    assert!(deck.element(0, 1).is_some());
}

#[tokio::test]
async fn consumer_without_provider_fails_gracefully() {
    let mut deck = Deck {
        slides: vec![Slide {
            elements: vec![text_element(1, "id: never_published\nid_type: meta")],
        }],
    };
    let service = MockQueryService::new();

    let report = run_pipeline(&mut deck, &service, &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(service.run_calls(), 0);
    assert_eq!(report.failed(), 1);
}

// ============================================================================
// FILTERS AND TABLES
// ============================================================================

#[tokio::test]
async fn run_level_filter_reaches_the_executed_query() {
    let mut deck = Deck {
        slides: vec![Slide {
            elements: vec![text_element(
                1,
                "id: '42'\nfilter: orders.region\nlabel: orders count",
            )],
        }],
    };

    let service = MockQueryService::new()
        .with_look(look("42", "orders"))
        .with_result("orders", RawResult::Tabular(orders_payload()));

    let options = RunOptions {
        filter: Some("APAC".to_string()),
        ..RunOptions::default()
    };
    run_pipeline(&mut deck, &service, &options).await.unwrap();

    let executed = service.executed_requests();
    assert_eq!(executed.len(), 1);
    assert_eq!(
        executed[0].body.filters.as_ref().unwrap()["orders.region"],
        "APAC"
    );
}

#[tokio::test]
async fn table_fill_is_bounded_and_clears_stale_cells() {
    let mut grid = TableGrid::new(4, 3);
    for r in 0..4 {
        for c in 0..3 {
            grid.set_cell(r, c, "stale");
        }
    }
    let mut deck = Deck {
        slides: vec![Slide {
            elements: vec![Element {
                id: 1,
                name: "table-1".to_string(),
                binding: Some("id: '42'".to_string()),
                frame: Frame {
                    left: 0.0,
                    top: 0.0,
                    width: 300.0,
                    height: 120.0,
                },
                content: Content::Table(grid),
            }],
        }],
    };

    let service = MockQueryService::new()
        .with_look(look("42", "orders"))
        .with_result("orders", RawResult::Tabular(orders_payload()));

    run_pipeline(&mut deck, &service, &RunOptions::default())
        .await
        .unwrap();

    let Content::Table(grid) = &deck.element(0, 1).unwrap().content else {
        panic!("table vanished");
    };
    // header row + two data rows in the first two columns; the rest clear
    assert_eq!(grid.cell(0, 0), Some("date"));
    assert_eq!(grid.cell(1, 0), Some("jan"));
    assert_eq!(grid.cell(2, 1), Some("21"));
    assert_eq!(grid.cell(3, 0), Some(""));
    assert_eq!(grid.cell(0, 2), Some(""));
}

// ============================================================================
// IMAGES
// ============================================================================

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::new(width, height);
    let mut bytes = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut bytes, image::ImageFormat::Png)
        .unwrap();
    bytes.into_inner()
}

#[tokio::test]
async fn image_result_is_aspect_fitted_and_centered() {
    let mut deck = Deck {
        slides: vec![Slide {
            elements: vec![Element {
                id: 1,
                name: "image-1".to_string(),
                binding: Some("id: '42'".to_string()),
                frame: Frame {
                    left: 100.0,
                    top: 50.0,
                    width: 400.0,
                    height: 200.0,
                },
                content: Content::Image(ImageFrame::default()),
            }],
        }],
    };

    // 200x200 square into a 400x200 box: scaled to 200x200, centered.
    let service = MockQueryService::new()
        .with_look(look("42", "orders"))
        .with_result("orders", RawResult::Binary(png_bytes(200, 200)));

    let report = run_pipeline(&mut deck, &service, &RunOptions::default())
        .await
        .unwrap();
    assert_eq!(report.rendered(), 1);

    let element = deck.element(0, 1).unwrap();
    assert_eq!(element.frame.width, 200.0);
    assert_eq!(element.frame.height, 200.0);
    assert_eq!(element.frame.left, 200.0);
    assert_eq!(element.frame.top, 50.0);

    let Content::Image(img) = &element.content else {
        panic!("image vanished");
    };
    assert!(img.data.is_some());
    assert_eq!(img.native_width, Some(200));

    // push-down requested the element's designed size from the backend
    let executed = service.executed_requests();
    assert_eq!(executed[0].result_format, "png");
    assert_eq!(executed[0].image_width, Some(400));
    assert_eq!(executed[0].image_height, Some(200));
}

#[tokio::test]
async fn tabular_image_result_fetches_the_url() {
    let mut deck = Deck {
        slides: vec![Slide {
            elements: vec![Element {
                id: 1,
                name: "image-1".to_string(),
                binding: Some("id: '42'\nresult_format: json_bi".to_string()),
                frame: Frame {
                    left: 0.0,
                    top: 0.0,
                    width: 100.0,
                    height: 100.0,
                },
                content: Content::Image(ImageFrame::default()),
            }],
        }],
    };

    let url = "https://img.example.com/render.png";
    let service = MockQueryService::new()
        .with_look(look("42", "orders"))
        .with_result(
            "orders",
            RawResult::Tabular(json!({"rows": [{"image.url": {"value": url}}]})),
        )
        .with_image(url, png_bytes(10, 10));

    let report = run_pipeline(&mut deck, &service, &RunOptions::default())
        .await
        .unwrap();
    assert_eq!(report.rendered(), 1);
}

// ============================================================================
// PARSE ISOLATION
// ============================================================================

#[tokio::test]
async fn malformed_binding_drops_element_without_aborting() {
    let mut deck = Deck {
        slides: vec![Slide {
            elements: vec![
                text_element(1, "not a binding at all: ["),
                text_element(2, "id: '42'\nlabel: orders count"),
            ],
        }],
    };

    assert_eq!(collect_bound_elements(&deck).len(), 1);

    let service = MockQueryService::new()
        .with_look(look("42", "orders"))
        .with_result("orders", RawResult::Tabular(orders_payload()));

    let report = run_pipeline(&mut deck, &service, &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(report.bound_elements, 1);
    assert_eq!(element_text(&deck, 0, 2), "17");
    // the malformed element is left untouched
    assert_eq!(element_text(&deck, 0, 1), "placeholder");
}
