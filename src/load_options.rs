use crate::filters::DEFAULT_CAPACITY;

/// Options for opening PDF documents
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Capacity of the buffer every stream filter works with
    pub filter_buffer_capacity: usize,

    /// Upper bound on the number of cross-reference sections followed through `Prev`
    pub max_xref_sections: usize,

    /// Scan for `endstream` when a stream's `Length` is wrong or missing
    pub recover_stream_length: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            filter_buffer_capacity: DEFAULT_CAPACITY,
            max_xref_sections: 1024,
            recover_stream_length: true,
        }
    }
}

impl LoadOptions {
    /// Create a builder for LoadOptions
    pub fn builder() -> LoadOptionsBuilder {
        LoadOptionsBuilder::default()
    }
}

/// Builder for LoadOptions
#[derive(Default)]
pub struct LoadOptionsBuilder {
    filter_buffer_capacity: Option<usize>,
    max_xref_sections: Option<usize>,
    recover_stream_length: Option<bool>,
}

impl LoadOptionsBuilder {
    /// Set the filter buffer capacity; 0 keeps the default
    pub fn filter_buffer_capacity(mut self, value: usize) -> Self {
        self.filter_buffer_capacity = Some(value);
        self
    }

    /// Set the maximum number of cross-reference sections; 0 keeps the default
    pub fn max_xref_sections(mut self, value: usize) -> Self {
        self.max_xref_sections = Some(value);
        self
    }

    /// Enable or disable stream length recovery
    pub fn recover_stream_length(mut self, value: bool) -> Self {
        self.recover_stream_length = Some(value);
        self
    }

    /// Build the LoadOptions
    pub fn build(self) -> LoadOptions {
        let defaults = LoadOptions::default();
        LoadOptions {
            filter_buffer_capacity: self
                .filter_buffer_capacity
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.filter_buffer_capacity),
            max_xref_sections: self
                .max_xref_sections
                .filter(|max| *max > 0)
                .unwrap_or(defaults.max_xref_sections),
            recover_stream_length: self.recover_stream_length.unwrap_or(defaults.recover_stream_length),
        }
    }
}
