//! Tabular view engine: filter, stable sort, paginate, and aggregate over an
//! in-memory record slice.
//!
//! [`ViewEngine::recompute`] is a pure function of records and [`ViewState`];
//! [`TableView`] wraps it with the setters a page drives (search, category,
//! date range, sort toggle, page changes) and keeps the current page clamped.

pub mod aggregate;
pub mod dates;
pub mod fields;
pub mod pagination;
pub mod predicate;
pub mod sort;

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub use aggregate::{AggregateSpec, AggregateValue, CategoryCount, SeriesPoint};
pub use fields::{FieldDescriptor, FieldRegistry, FieldValue, ValueKind};
pub use pagination::{PageWindow, PaginationMode, PaginationState, ServerPage};
pub use predicate::{CategoryFilter, DateRange, FilterState};
pub use sort::{Comparator, SortDirection, SortState};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("unknown field '{key}'")]
    UnknownField { key: String },

    #[error("field '{key}' is already registered")]
    DuplicateField { key: String },

    #[error("field key must not be empty")]
    EmptyFieldKey,

    #[error("field '{key}' is a {actual} field, expected {expected}")]
    FieldKindMismatch {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("date range filtering needs a date field")]
    MissingDateField,

    #[error("page size must be a positive integer")]
    InvalidPageSize,

    #[error("aggregate '{name}' is defined twice")]
    DuplicateAggregate { name: String },
}

/// Static, per-view setup: which fields exist and how the page uses them.
pub struct ViewConfig<R> {
    registry: FieldRegistry<R>,
    searchable: Vec<String>,
    columns: Vec<String>,
    date_field: Option<String>,
    aggregates: Vec<(String, AggregateSpec)>,
    default_sort: Option<SortState>,
    page_size: usize,
}

impl<R> ViewConfig<R> {
    pub fn new(registry: FieldRegistry<R>) -> Self {
        Self {
            registry,
            searchable: Vec::new(),
            columns: Vec::new(),
            date_field: None,
            aggregates: Vec::new(),
            default_sort: None,
            page_size: pagination::DEFAULT_PAGE_SIZE,
        }
    }

    pub fn searchable<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.searchable = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Display columns; every registered field when left empty.
    pub fn columns<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn date_field(mut self, key: &str) -> Self {
        self.date_field = Some(key.to_string());
        self
    }

    pub fn aggregate(mut self, name: &str, spec: AggregateSpec) -> Self {
        self.aggregates.push((name.to_string(), spec));
        self
    }

    pub fn default_sort(mut self, sort: SortState) -> Self {
        self.default_sort = Some(sort);
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ViewState {
    pub filter: FilterState,
    pub sort: Option<SortState>,
    pub pagination: PaginationState,
}

#[derive(Debug, Serialize)]
pub struct ViewResult<'r, R> {
    pub filtered_count: usize,
    pub total_records: usize,
    pub total_pages: usize,
    pub current_page: usize,
    pub page_items: Vec<&'r R>,
    pub aggregates: BTreeMap<String, AggregateValue>,
}

pub struct ViewEngine<R> {
    config: ViewConfig<R>,
}

impl<R> ViewEngine<R> {
    /// Validates every key the view refers to so mistakes surface here and
    /// not during interaction.
    pub fn new(config: ViewConfig<R>) -> Result<Self, ConfigurationError> {
        let registry = &config.registry;
        for key in config.searchable.iter().chain(config.columns.iter()) {
            registry.get(key)?;
        }
        if let Some(key) = config.date_field.as_deref() {
            let field = registry.get(key)?;
            if field.kind() != ValueKind::Date {
                return Err(ConfigurationError::FieldKindMismatch {
                    key: key.to_string(),
                    expected: ValueKind::Date.label(),
                    actual: field.kind().label(),
                });
            }
        }
        let mut names = HashSet::new();
        for (name, spec) in config.aggregates.iter() {
            if !names.insert(name.as_str()) {
                return Err(ConfigurationError::DuplicateAggregate { name: name.clone() });
            }
            spec.validate(registry)?;
        }
        if let Some(sort) = config.default_sort.as_ref() {
            registry.get(&sort.key)?;
        }
        if config.page_size == 0 {
            return Err(ConfigurationError::InvalidPageSize);
        }
        Ok(Self { config })
    }

    pub fn registry(&self) -> &FieldRegistry<R> {
        &self.config.registry
    }

    pub fn date_field(&self) -> Option<&str> {
        self.config.date_field.as_deref()
    }

    pub fn searchable(&self) -> &[String] {
        &self.config.searchable
    }

    pub fn columns(&self) -> Vec<&str> {
        if self.config.columns.is_empty() {
            self.config.registry.keys().collect()
        } else {
            self.config.columns.iter().map(String::as_str).collect()
        }
    }

    pub fn initial_state(&self) -> ViewState {
        ViewState {
            filter: FilterState::default(),
            sort: self.config.default_sort.clone(),
            pagination: PaginationState::new(self.config.page_size, 1).unwrap_or_default(),
        }
    }

    /// Filter, sort, window, and aggregate. Aggregates see the whole filtered
    /// set, never just the page.
    pub fn recompute<'r>(
        &self,
        records: &'r [R],
        state: &ViewState,
        mode: &PaginationMode,
    ) -> Result<ViewResult<'r, R>, ConfigurationError> {
        let registry = &self.config.registry;
        let predicate = predicate::compile(
            &state.filter,
            registry,
            &self.config.searchable,
            self.config.date_field.as_deref(),
        )?;
        let mut matched = predicate.apply(records);

        if let Some(sort) = state.sort.as_ref() {
            match Comparator::build(sort, registry) {
                Some(cmp) => cmp.sort(&mut matched),
                None => debug!(key = %sort.key, "sort key not registered, keeping feed order"),
            }
        }

        let mut aggregates = BTreeMap::new();
        for (name, spec) in self.config.aggregates.iter() {
            aggregates.insert(name.clone(), aggregate::compute(spec, registry, &matched)?);
        }

        let (window, total_records) = match mode {
            PaginationMode::Local => (
                pagination::window(
                    matched.len(),
                    state.pagination.page_size(),
                    state.pagination.current_page(),
                ),
                records.len(),
            ),
            PaginationMode::Server(page) => (page.window(matched.len()), page.total_records),
        };

        Ok(ViewResult {
            filtered_count: window.filtered_count,
            total_records,
            total_pages: window.total_pages,
            current_page: window.clamped_page,
            page_items: window.slice(&matched).to_vec(),
            aggregates,
        })
    }
}

/// One page's engine, records and interaction state.
pub struct TableView<R> {
    engine: ViewEngine<R>,
    records: Vec<R>,
    mode: PaginationMode,
    state: ViewState,
}

impl<R> TableView<R> {
    pub fn new(engine: ViewEngine<R>) -> Self {
        let state = engine.initial_state();
        Self {
            engine,
            records: Vec::new(),
            mode: PaginationMode::Local,
            state,
        }
    }

    pub fn with_records(mut self, records: Vec<R>) -> Self {
        self.records = records;
        self
    }

    /// Swaps in freshly loaded records. A server-paginated page also moves
    /// the current page to the one the server answered with.
    pub fn replace_records(&mut self, records: Vec<R>, mode: PaginationMode) {
        if let PaginationMode::Server(page) = mode {
            self.state.pagination.set_page(page.current_page);
        }
        self.records = records;
        self.mode = mode;
    }

    pub fn engine(&self) -> &ViewEngine<R> {
        &self.engine
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn mode(&self) -> PaginationMode {
        self.mode
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn set_search(&mut self, text: &str) {
        self.state.filter.free_text = text.to_string();
        self.state.pagination.set_page(1);
    }

    pub fn set_category(
        &mut self,
        key: &str,
        choice: CategoryFilter,
    ) -> Result<(), ConfigurationError> {
        self.engine.registry().get(key)?;
        self.state.filter.categorical.insert(key.to_string(), choice);
        self.state.pagination.set_page(1);
        Ok(())
    }

    pub fn set_date_range(&mut self, range: DateRange) -> Result<(), ConfigurationError> {
        if range.is_active() && self.engine.date_field().is_none() {
            return Err(ConfigurationError::MissingDateField);
        }
        self.state.filter.date_range = range;
        self.state.pagination.set_page(1);
        Ok(())
    }

    pub fn clear_filters(&mut self) {
        self.state.filter = FilterState::default();
        self.state.pagination.set_page(1);
    }

    pub fn toggle_sort(&mut self, key: &str) -> Result<&SortState, ConfigurationError> {
        self.engine.registry().get(key)?;
        let next = SortState::toggled(self.state.sort.as_ref(), key);
        self.state.pagination.set_page(1);
        Ok(self.state.sort.insert(next))
    }

    pub fn set_page(&mut self, page: usize) {
        self.state.pagination.set_page(page);
    }

    pub fn set_page_size(&mut self, page_size: usize) -> Result<(), ConfigurationError> {
        self.state.pagination.set_page_size(page_size)?;
        self.state.pagination.set_page(1);
        Ok(())
    }

    /// Stores the clamped page back into the state so the view never reports
    /// a page past the end.
    pub fn sync_page(&mut self) -> Result<usize, ConfigurationError> {
        let page = self
            .engine
            .recompute(&self.records, &self.state, &self.mode)?
            .current_page;
        self.state.pagination.set_page(page);
        Ok(page)
    }

    /// Result for the current state without touching it.
    pub fn current(&self) -> Result<ViewResult<'_, R>, ConfigurationError> {
        self.engine.recompute(&self.records, &self.state, &self.mode)
    }

    pub fn view(&mut self) -> Result<ViewResult<'_, R>, ConfigurationError> {
        let result = self.engine.recompute(&self.records, &self.state, &self.mode)?;
        self.state.pagination.set_page(result.current_page);
        Ok(result)
    }
}
