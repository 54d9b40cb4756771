//! Faculty feedback back-end.
//!
//! ## Overview
//!
//! Admins manage students, faculty and teaching assignments. A student who
//! logs in is owed one feedback form per faculty and subject taught to their
//! cohort `(year, semester, department, section)`. Forms are created lazily
//! the first time the student lists them and can be submitted exactly once;
//! an admin bulk reset reopens them for the next term.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (axum Router, ServeDir, TraceLayer)  │
//! │          │ <─────── │    └─ api.rs  (route handlers, AppState)         │
//! └──────────┘          │         │                                        │
//!                       │         │ AdminSession / StudentSession          │
//!                       │         v                                        │
//!                       │  session.rs  ──> tokens.rs (TokenService)        │
//!                       │         │                                        │
//!                       │         │ provision_for() / submit()             │
//!                       │         v                                        │
//!                       │  provisioning.rs   submission.rs                 │
//!                       │         │                                        │
//!                       │         v                                        │
//!                       │  db.rs  (FeedbackDb behind DbHandle)             │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module       | Responsibility                                          |
//! |--------------|---------------------------------------------------------|
//! | `models`     | Shared types: `Student`, `Faculty`, `FeedbackForm`      |
//! | `accounts`   | Admin registration/login, student login, passwords      |
//! | `password`   | Argon2 hashing and verification                         |
//! | `directory`  | Student and faculty CRUD, teaching assignments          |
//! | `blob`       | `BlobStore` trait + local filesystem implementation     |
//!
//! ## Typical Request Flow (student opens the feedback page)
//!
//! 1. `GET /api/student/feedback` → `StudentSession` verifies the access
//!    token and reloads the student by id.
//! 2. `provisioning::provision_for()` finds faculty teaching the student's
//!    cohort, plans the missing `(faculty, subject_code)` forms and inserts
//!    them with `ON CONFLICT DO NOTHING`.
//! 3. All of the student's forms come back in the success envelope.
//! 4. `POST /api/student/feedback/{id}` → `submission::submit()` validates
//!    the answers and flips `attempted` with a conditional update.

pub mod accounts;
pub mod api;
pub mod blob;
pub mod db;
pub mod directory;
pub mod models;
pub mod password;
pub mod provisioning;
pub mod server;
pub mod session;
pub mod submission;
pub mod tokens;
