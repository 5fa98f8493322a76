use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::report::{self, ReportRequest};
use crate::store::StoreError;
use rusqlite::Connection;
use serde_json::json;

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn parse_request(req: &Request) -> Result<ReportRequest, serde_json::Value> {
    serde_json::from_value(req.params.clone())
        .map_err(|e| err(&req.id, "bad_params", e.to_string(), None))
}

/// Store failures carry the attempted request filters in the error details
/// so a failed fetch can be diagnosed from the reply alone.
fn report_err(req: &Request, e: StoreError) -> serde_json::Value {
    let details = match e.details {
        Some(d) => Some(d),
        None if e.code == "db_query_failed" => Some(json!({ "filters": req.params })),
        None => None,
    };
    err(&req.id, &e.code, e.message, details)
}

fn handle_grade_report_model(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let report_req = match parse_request(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match report::build_grade_report(conn, &report_req) {
        Ok(model) => ok(&req.id, json!(model)),
        Err(e) => report_err(req, e),
    }
}

fn handle_attendance_report_model(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let report_req = match parse_request(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match report::build_attendance_report(conn, &report_req) {
        Ok(model) => ok(&req.id, json!(model)),
        Err(e) => report_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.gradeReportModel" => Some(handle_grade_report_model(state, req)),
        "reports.attendanceReportModel" => Some(handle_attendance_report_model(state, req)),
        _ => None,
    }
}
