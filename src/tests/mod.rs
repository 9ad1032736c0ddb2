use chrono::NaiveDate;

use crate::engine::{
    AggregateSpec, CategoryFilter, ConfigurationError, DateRange, FieldRegistry, FieldValue,
    PaginationMode, ServerPage, SortDirection, SortState, TableView, ValueKind, ViewConfig,
    ViewEngine,
};

#[derive(Clone, Debug, PartialEq)]
struct Incident {
    name: String,
    kind: String,
    amount: Option<f64>,
    when: Option<String>,
}

fn incident(name: &str, kind: &str, amount: Option<f64>, when: Option<&str>) -> Incident {
    Incident {
        name: name.to_string(),
        kind: kind.to_string(),
        amount,
        when: when.map(str::to_string),
    }
}

fn registry() -> FieldRegistry<Incident> {
    FieldRegistry::new()
        .with("name", ValueKind::String, |r: &Incident| FieldValue::text(r.name.as_str()))
        .unwrap()
        .with("kind", ValueKind::Nullable, |r: &Incident| FieldValue::text(r.kind.as_str()))
        .unwrap()
        .with("amount", ValueKind::Number, |r: &Incident| FieldValue::from_opt_f64(r.amount))
        .unwrap()
        .with("when", ValueKind::Date, |r: &Incident| {
            FieldValue::from_opt_str(r.when.as_deref())
        })
        .unwrap()
}

fn engine(page_size: usize) -> ViewEngine<Incident> {
    ViewEngine::new(
        ViewConfig::new(registry())
            .searchable(["name", "kind"])
            .date_field("when")
            .aggregate("count", AggregateSpec::Count)
            .aggregate("total", AggregateSpec::sum("amount"))
            .aggregate("monthly", AggregateSpec::monthly("when", Some("amount")))
            .page_size(page_size),
    )
    .unwrap()
}

fn numbered(count: usize) -> Vec<Incident> {
    (0..count)
        .map(|i| {
            let kind = if i % 3 == 0 { "bridge" } else { "rugpull" };
            let day = format!("2024-{:02}-{:02}", i % 12 + 1, i % 28 + 1);
            incident(&format!("incident-{i}"), kind, Some(i as f64), Some(&day))
        })
        .collect()
}

fn names(items: &[&Incident]) -> Vec<String> {
    items.iter().map(|r| r.name.clone()).collect()
}

#[test]
fn filtering_twice_changes_nothing() {
    let engine = engine(100);
    let data = numbered(40);
    let mut state = engine.initial_state();
    state.filter.free_text = "bridge".to_string();
    state.filter.date_range = DateRange::new(NaiveDate::from_ymd_opt(2024, 3, 1), None);

    let first = engine.recompute(&data, &state, &PaginationMode::Local).unwrap();
    let once: Vec<Incident> = first.page_items.iter().map(|r| (*r).clone()).collect();
    let second = engine.recompute(&once, &state, &PaginationMode::Local).unwrap();

    assert!(first.filtered_count > 0);
    assert_eq!(first.filtered_count, second.filtered_count);
    assert_eq!(names(&first.page_items), names(&second.page_items));
}

#[test]
fn pages_partition_the_filtered_set() {
    let data = numbered(47);
    for page_size in [1, 5, 10, 20, 47, 100] {
        let engine = engine(page_size);
        let mut state = engine.initial_state();
        state.filter.categorical.insert("kind".to_string(), CategoryFilter::only("rugpull"));

        let first = engine.recompute(&data, &state, &PaginationMode::Local).unwrap();
        let mut seen = Vec::new();
        for page in 1..=first.total_pages {
            state.pagination.set_page(page);
            let result = engine.recompute(&data, &state, &PaginationMode::Local).unwrap();
            assert!(result.page_items.len() <= page_size);
            assert_eq!(result.current_page, page);
            seen.extend(names(&result.page_items));
        }
        assert_eq!(seen.len(), first.filtered_count);
        assert_eq!(first.total_pages, first.filtered_count.div_ceil(page_size).max(1));
    }
}

#[test]
fn equal_sort_keys_keep_feed_order() {
    let engine = engine(100);
    let data = vec![
        incident("first", "bridge", Some(10.0), None),
        incident("second", "rugpull", Some(5.0), None),
        incident("third", "bridge", Some(10.0), None),
        incident("fourth", "rugpull", Some(5.0), None),
    ];
    let mut state = engine.initial_state();
    state.sort = Some(SortState::ascending("kind"));
    let result = engine.recompute(&data, &state, &PaginationMode::Local).unwrap();
    assert_eq!(names(&result.page_items), ["first", "third", "second", "fourth"]);

    state.sort = Some(SortState::descending("amount"));
    let result = engine.recompute(&data, &state, &PaginationMode::Local).unwrap();
    assert_eq!(names(&result.page_items), ["first", "third", "second", "fourth"]);
}

#[test]
fn missing_values_sort_last_both_ways() {
    let engine = engine(100);
    let data = vec![
        incident("one", "x", Some(1.0), None),
        incident("none", "x", None, None),
        incident("five", "x", Some(5.0), None),
    ];
    let mut state = engine.initial_state();

    state.sort = Some(SortState::ascending("amount"));
    let asc = engine.recompute(&data, &state, &PaginationMode::Local).unwrap();
    assert_eq!(names(&asc.page_items), ["one", "five", "none"]);

    state.sort = Some(SortState::descending("amount"));
    let desc = engine.recompute(&data, &state, &PaginationMode::Local).unwrap();
    assert_eq!(names(&desc.page_items), ["five", "one", "none"]);
}

#[test]
fn unparsable_dates_drop_out_only_under_a_bound() {
    let engine = engine(100);
    let data = vec![
        incident("dated", "x", None, Some("2024-02-10")),
        incident("garbled", "x", None, Some("sometime in spring")),
        incident("undated", "x", None, None),
    ];
    let mut state = engine.initial_state();
    let open = engine.recompute(&data, &state, &PaginationMode::Local).unwrap();
    assert_eq!(open.filtered_count, 3);

    state.filter.date_range = DateRange::new(NaiveDate::from_ymd_opt(2024, 1, 1), None);
    let bounded = engine.recompute(&data, &state, &PaginationMode::Local).unwrap();
    assert_eq!(names(&bounded.page_items), ["dated"]);
}

#[test]
fn date_bounds_are_inclusive_days() {
    let engine = engine(100);
    let data = vec![
        incident("start", "x", None, Some("2024-03-01T00:00:00")),
        incident("end", "x", None, Some("2024-03-31T23:59:59")),
        incident("after", "x", None, Some("2024-04-01")),
    ];
    let mut state = engine.initial_state();
    state.filter.date_range = DateRange::new(
        NaiveDate::from_ymd_opt(2024, 3, 1),
        NaiveDate::from_ymd_opt(2024, 3, 31),
    );
    let result = engine.recompute(&data, &state, &PaginationMode::Local).unwrap();
    assert_eq!(names(&result.page_items), ["start", "end"]);
}

#[test]
fn totals_cover_the_filtered_set_on_every_page() {
    let data = numbered(30);
    let bridges: Vec<f64> = (0..30).filter(|i| i % 3 == 0).map(|i| i as f64).collect();
    let expected: f64 = bridges.iter().sum();
    for page_size in [1, 3, 7, 30] {
        let engine = engine(page_size);
        let mut state = engine.initial_state();
        state.filter.categorical.insert("kind".to_string(), CategoryFilter::only("bridge"));
        let pages = bridges.len().div_ceil(page_size);
        for page in 1..=pages {
            state.pagination.set_page(page);
            let result = engine.recompute(&data, &state, &PaginationMode::Local).unwrap();
            assert_eq!(result.current_page, page);
            assert_eq!(result.aggregates["total"].as_scalar(), Some(expected));
            assert_eq!(
                result.aggregates["count"].as_scalar(),
                Some(bridges.len() as f64)
            );
        }
    }
}

#[test]
fn twenty_five_records_make_two_pages_of_twenty() {
    let engine = engine(20);
    let data = numbered(25);
    let mut state = engine.initial_state();
    let first = engine.recompute(&data, &state, &PaginationMode::Local).unwrap();
    assert_eq!(first.total_pages, 2);
    assert_eq!(first.page_items.len(), 20);

    state.pagination.set_page(2);
    let second = engine.recompute(&data, &state, &PaginationMode::Local).unwrap();
    assert_eq!(second.page_items.len(), 5);
    assert_eq!(second.page_items[0].name, "incident-20");
}

#[test]
fn shrinking_results_clamp_the_page() {
    let mut view = TableView::new(engine(20)).with_records(numbered(25));
    view.set_page(2);
    assert_eq!(view.view().unwrap().current_page, 2);

    let five: Vec<Incident> = numbered(5);
    view.replace_records(five, PaginationMode::Local);
    let page = view.sync_page().unwrap();
    assert_eq!(page, 1);
    assert_eq!(view.state().pagination.current_page(), 1);
    assert_eq!(view.current().unwrap().page_items.len(), 5);
}

#[test]
fn empty_results_still_report_one_page() {
    let mut view = TableView::new(engine(20)).with_records(numbered(10));
    view.set_search("no such incident");
    let result = view.view().unwrap();
    assert_eq!(result.filtered_count, 0);
    assert_eq!(result.total_pages, 1);
    assert_eq!(result.current_page, 1);
    assert!(result.page_items.is_empty());
}

#[test]
fn filter_changes_reset_to_the_first_page() {
    let mut view = TableView::new(engine(5)).with_records(numbered(30));
    view.set_page(4);
    view.set_category("kind", CategoryFilter::only("bridge")).unwrap();
    assert_eq!(view.state().pagination.current_page(), 1);

    view.set_page(2);
    view.set_search("incident");
    assert_eq!(view.state().pagination.current_page(), 1);

    view.clear_filters();
    assert!(view.state().filter.is_empty());
    assert_eq!(view.current().unwrap().filtered_count, 30);
}

#[test]
fn sort_toggle_cycles_between_directions() {
    let mut view = TableView::new(engine(20));
    assert_eq!(view.toggle_sort("amount").unwrap().direction, SortDirection::Asc);
    assert_eq!(view.toggle_sort("amount").unwrap().direction, SortDirection::Desc);
    assert_eq!(view.toggle_sort("amount").unwrap().direction, SortDirection::Asc);

    let other = view.toggle_sort("name").unwrap();
    assert_eq!(other.key, "name");
    assert_eq!(other.direction, SortDirection::Asc);

    assert!(matches!(
        view.toggle_sort("nope"),
        Err(ConfigurationError::UnknownField { .. })
    ));
}

#[test]
fn monthly_series_is_chronological() {
    let engine = engine(20);
    let data = vec![
        incident("a", "x", Some(3.0), Some("2024-02-14")),
        incident("b", "x", Some(1.0), Some("2023-12-01")),
        incident("c", "x", Some(2.0), Some("2024-01-20")),
        incident("d", "x", Some(4.0), Some("2024-02-01")),
        incident("e", "x", Some(9.0), None),
    ];
    let result = engine
        .recompute(&data, &engine.initial_state(), &PaginationMode::Local)
        .unwrap();
    let series = result.aggregates["monthly"].as_series().unwrap();
    let labels: Vec<&str> = series.iter().map(|p| p.label.as_str()).collect();
    assert_eq!(labels, ["Dec 2023", "Jan 2024", "Feb 2024"]);
    assert_eq!(series[2].value, 7.0);
}

#[test]
fn a_category_named_all_is_still_a_filter() {
    let engine = engine(20);
    let data = vec![
        incident("literal", "all", None, None),
        incident("other", "bridge", None, None),
    ];
    let mut state = engine.initial_state();

    state.filter.categorical.insert("kind".to_string(), CategoryFilter::only("all"));
    let only = engine.recompute(&data, &state, &PaginationMode::Local).unwrap();
    assert_eq!(names(&only.page_items), ["literal"]);

    state.filter.categorical.insert("kind".to_string(), CategoryFilter::All);
    let every = engine.recompute(&data, &state, &PaginationMode::Local).unwrap();
    assert_eq!(every.filtered_count, 2);
}

#[test]
fn server_pages_pass_through() {
    let engine = engine(100);
    let data = numbered(100);
    let page = ServerPage {
        total_records: 4321,
        total_pages: 44,
        current_page: 3,
        page_size: 100,
    };
    let mut view = TableView::new(engine);
    view.set_page(1);
    view.replace_records(data, PaginationMode::Server(page));
    let result = view.view().unwrap();
    assert_eq!(result.current_page, 3);
    assert_eq!(result.total_pages, 44);
    assert_eq!(result.total_records, 4321);
    assert_eq!(result.page_items.len(), 100);
}

#[test]
fn bad_configuration_fails_up_front() {
    let unknown = ViewEngine::new(ViewConfig::new(registry()).columns(["name", "ghost"]));
    assert!(matches!(unknown, Err(ConfigurationError::UnknownField { .. })));

    let wrong_kind = ViewEngine::new(ViewConfig::new(registry()).date_field("name"));
    assert!(matches!(
        wrong_kind,
        Err(ConfigurationError::FieldKindMismatch { .. })
    ));

    let zero = ViewEngine::new(ViewConfig::new(registry()).page_size(0));
    assert!(matches!(zero, Err(ConfigurationError::InvalidPageSize)));

    let no_dates = ViewEngine::new(ViewConfig::new(registry())).unwrap();
    let mut view = TableView::new(no_dates);
    let range = DateRange::new(NaiveDate::from_ymd_opt(2024, 1, 1), None);
    assert_eq!(
        view.set_date_range(range),
        Err(ConfigurationError::MissingDateField)
    );
}

#[test]
fn exploit_preset_sums_the_filtered_losses() {
    use crate::feeds::records::Web3Exploit;

    let exploit = |chain: &str, lost: f64| Web3Exploit {
        chain: Some(chain.to_string()),
        funds_lost: Some(lost),
        date: Some("2024-05-02".to_string()),
        ..Default::default()
    };
    let engine = ViewEngine::new(crate::views::web3_exploit_view().unwrap()).unwrap();
    let mut view = TableView::new(engine).with_records(vec![
        exploit("Ethereum", 1_000.0),
        exploit("BSC", 250.0),
        exploit("Ethereum", 500.0),
    ]);
    view.set_category("chain", CategoryFilter::only("Ethereum")).unwrap();
    let result = view.view().unwrap();
    assert_eq!(result.filtered_count, 2);
    assert_eq!(result.aggregates["total_lost"].as_scalar(), Some(1_500.0));
}
