pub mod llm; // Model transport: Gemini client and test mock
pub mod ingest; // Upload checks and MIME inference
pub mod knowledge; // Batch extraction, merge, continuation sessions
pub mod diagnosis; // Knowledge-grounded diagnosis
