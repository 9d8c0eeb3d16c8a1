// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod detect;
pub mod errors;
pub mod http_server;

pub use detect::{detect_handler, DetectQuery, Detection, DetectionResponse};
pub use errors::{ApiError, ApiRejection, ErrorResponse};
pub use http_server::{build_router, start_server, AppState, DETECTIONS_HEADER};
