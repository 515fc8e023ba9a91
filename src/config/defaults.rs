//! Default values for configuration

pub fn default_qdrant_url() -> String {
    "http://localhost:6334".to_string()
}

pub fn default_collection_name() -> String {
    "docs".to_string()
}

pub fn default_embedding_url() -> String {
    "http://localhost:8089".to_string()
}

pub fn default_embedding_model() -> String {
    "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2".to_string()
}

pub fn default_embedding_dimension() -> usize {
    384
}

pub fn default_embedding_batch_size() -> usize {
    32
}

pub fn default_drive_base_url() -> String {
    "https://www.googleapis.com".to_string()
}

pub fn default_drive_token_env() -> String {
    "DRIVE_ACCESS_TOKEN".to_string()
}

pub fn default_drive_page_size() -> u32 {
    1000
}

pub fn default_max_rows_per_sheet() -> u32 {
    2000
}

pub fn default_rate_limit_rps() -> f64 {
    8.0
}

pub fn default_rate_limit_burst() -> f64 {
    16.0
}

pub fn default_retry_max_retries() -> u32 {
    8
}

pub fn default_retry_base_delay_secs() -> f64 {
    1.0
}

pub fn default_retry_max_delay_secs() -> f64 {
    30.0
}

pub fn default_ingest_mode() -> String {
    "loop".to_string()
}

pub fn default_ingest_poll_secs() -> u64 {
    600
}

pub fn default_ingest_workers() -> usize {
    6
}

pub fn default_progress_every_files() -> u64 {
    25
}

pub fn default_progress_every_secs() -> u64 {
    30
}

pub fn default_shutdown_grace_secs() -> u64 {
    20
}

pub fn default_format_enabled() -> bool {
    true
}

pub fn default_text_max_file_size_mb() -> u64 {
    10
}

pub fn default_pdf_max_file_size_mb() -> u64 {
    50
}

pub fn default_office_max_file_size_mb() -> u64 {
    50
}

pub fn default_pdf_max_pages() -> usize {
    200
}

pub fn default_excel_max_sheets() -> usize {
    20
}

pub fn default_chunk_max_chars() -> usize {
    900
}

pub fn default_chunk_overlap() -> usize {
    120
}

pub fn default_top_k() -> usize {
    6
}

pub fn default_max_context_chars() -> usize {
    6000
}
