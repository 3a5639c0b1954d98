use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::schedule::{self, Booking, DayOfWeek};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use serde_json::json;
use uuid::Uuid;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

fn db_query_failed(e: rusqlite::Error) -> HandlerErr {
    HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    }
}

fn validation_failed(message: impl Into<String>, details: Option<serde_json::Value>) -> HandlerErr {
    HandlerErr {
        code: "validation_failed",
        message: message.into(),
        details,
    }
}

const REQUIRED_FIELDS: [&str; 7] = [
    "groupId",
    "classroomId",
    "courseId",
    "teacherId",
    "dayOfWeek",
    "startTime",
    "endTime",
];

struct Candidate {
    id: Option<String>,
    group_id: String,
    classroom_id: String,
    course_id: String,
    teacher_id: String,
    day: DayOfWeek,
    start_min: i64,
    end_min: i64,
}

fn non_empty_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Field presence is checked across the whole request so the caller gets
/// every missing field in one reply, not one per round trip.
fn parse_candidate(params: &serde_json::Value) -> Result<Candidate, HandlerErr> {
    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|k| non_empty_str(params, k).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(validation_failed(
            format!("missing required fields: {}", missing.join(", ")),
            Some(json!({ "missingFields": missing })),
        ));
    }

    let id = match params.get("id") {
        None | Some(serde_json::Value::Null) => None,
        Some(v) => match v.as_str().map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => Some(s.to_string()),
            None => return Err(validation_failed("id must be a non-empty string", None)),
        },
    };

    let day_raw = non_empty_str(params, "dayOfWeek").unwrap_or_default();
    let Some(day) = DayOfWeek::parse(&day_raw) else {
        return Err(validation_failed(
            format!("dayOfWeek must be a full day name, got \"{}\"", day_raw),
            None,
        ));
    };

    let start_raw = non_empty_str(params, "startTime").unwrap_or_default();
    let Some(start_min) = schedule::parse_time_minutes(&start_raw) else {
        return Err(validation_failed(
            format!("startTime must be HH:MM, got \"{}\"", start_raw),
            None,
        ));
    };
    let end_raw = non_empty_str(params, "endTime").unwrap_or_default();
    let Some(end_min) = schedule::parse_time_minutes(&end_raw) else {
        return Err(validation_failed(
            format!("endTime must be HH:MM, got \"{}\"", end_raw),
            None,
        ));
    };
    // Zero-length and inverted slots are rejected up front rather than
    // passed through as never-overlapping.
    if start_min >= end_min {
        return Err(validation_failed("endTime must be after startTime", None));
    }

    Ok(Candidate {
        id,
        group_id: non_empty_str(params, "groupId").unwrap_or_default(),
        classroom_id: non_empty_str(params, "classroomId").unwrap_or_default(),
        course_id: non_empty_str(params, "courseId").unwrap_or_default(),
        teacher_id: non_empty_str(params, "teacherId").unwrap_or_default(),
        day,
        start_min,
        end_min,
    })
}

fn booking_to_json(b: &Booking) -> serde_json::Value {
    json!({
        "id": b.id,
        "groupId": b.group_id,
        "classroomId": b.classroom_id,
        "courseId": b.course_id,
        "teacherId": b.teacher_id,
        "dayOfWeek": b.day_of_week,
        "startTime": schedule::format_time_minutes(b.start_min),
        "endTime": schedule::format_time_minutes(b.end_min),
    })
}

fn row_to_booking(r: &rusqlite::Row) -> rusqlite::Result<Booking> {
    Ok(Booking {
        id: r.get(0)?,
        group_id: r.get(1)?,
        classroom_id: r.get(2)?,
        course_id: r.get(3)?,
        teacher_id: r.get(4)?,
        day_of_week: r.get(5)?,
        start_min: r.get(6)?,
        end_min: r.get(7)?,
    })
}

const BOOKING_COLUMNS: &str =
    "id, group_id, classroom_id, course_id, teacher_id, day_of_week, start_min, end_min";

/// Scan the candidate's (classroom, day) slot for an overlapping booking,
/// skipping the candidate's own row on the update path. The empty-string
/// sentinel on the create path matches no real id.
fn find_conflict(
    conn: &Connection,
    cand: &Candidate,
    self_id: &str,
) -> Result<Option<Booking>, HandlerErr> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {BOOKING_COLUMNS}
             FROM bookings
             WHERE classroom_id = ? AND day_of_week = ? AND id != ?"
        ))
        .map_err(db_query_failed)?;
    let rows = stmt
        .query_map(
            (&cand.classroom_id, cand.day.as_str(), self_id),
            row_to_booking,
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_query_failed)?;

    Ok(rows.into_iter().find(|existing| {
        schedule::overlaps(
            cand.start_min,
            cand.end_min,
            existing.start_min,
            existing.end_min,
        )
    }))
}

/// Conflict check and write run inside one IMMEDIATE transaction: the write
/// lock is taken before the overlap scan, so two submissions racing for the
/// same slot from different connections cannot both pass the check.
fn schedule_submit(
    conn: &mut Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let cand = parse_candidate(params)?;

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| HandlerErr {
            code: "db_tx_failed",
            message: e.to_string(),
            details: None,
        })?;

    let self_id = cand.id.as_deref().unwrap_or("");
    if let Some(taken) = find_conflict(&tx, &cand, self_id)? {
        // tx dropped here; nothing written.
        return Err(HandlerErr {
            code: "schedule_conflict",
            message: "classroom already booked in this time slot on this day".to_string(),
            details: Some(json!({
                "bookingId": taken.id,
                "dayOfWeek": taken.day_of_week,
                "startTime": schedule::format_time_minutes(taken.start_min),
                "endTime": schedule::format_time_minutes(taken.end_min),
            })),
        });
    }

    let now = Utc::now().to_rfc3339();
    let (booking_id, created) = match &cand.id {
        Some(id) => {
            let exists = tx
                .query_row("SELECT 1 FROM bookings WHERE id = ?", [id], |r| {
                    r.get::<_, i64>(0)
                })
                .optional()
                .map_err(db_query_failed)?
                .is_some();
            if !exists {
                return Err(HandlerErr {
                    code: "not_found",
                    message: "booking not found".to_string(),
                    details: Some(json!({ "id": id })),
                });
            }
            tx.execute(
                "UPDATE bookings SET
                   group_id = ?, classroom_id = ?, course_id = ?, teacher_id = ?,
                   day_of_week = ?, start_min = ?, end_min = ?, updated_at = ?
                 WHERE id = ?",
                (
                    &cand.group_id,
                    &cand.classroom_id,
                    &cand.course_id,
                    &cand.teacher_id,
                    cand.day.as_str(),
                    cand.start_min,
                    cand.end_min,
                    &now,
                    id,
                ),
            )
            .map_err(|e| HandlerErr {
                code: "db_update_failed",
                message: e.to_string(),
                details: Some(json!({ "table": "bookings" })),
            })?;
            (id.clone(), false)
        }
        None => {
            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO bookings(
                   id, group_id, classroom_id, course_id, teacher_id,
                   day_of_week, start_min, end_min, updated_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    &id,
                    &cand.group_id,
                    &cand.classroom_id,
                    &cand.course_id,
                    &cand.teacher_id,
                    cand.day.as_str(),
                    cand.start_min,
                    cand.end_min,
                    &now,
                ),
            )
            .map_err(|e| HandlerErr {
                code: "db_update_failed",
                message: e.to_string(),
                details: Some(json!({ "table": "bookings" })),
            })?;
            (id, true)
        }
    };

    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;

    let booking = Booking {
        id: booking_id.clone(),
        group_id: cand.group_id,
        classroom_id: cand.classroom_id,
        course_id: cand.course_id,
        teacher_id: cand.teacher_id,
        day_of_week: cand.day.as_str().to_string(),
        start_min: cand.start_min,
        end_min: cand.end_min,
    };
    Ok(json!({
        "id": booking_id,
        "created": created,
        "booking": booking_to_json(&booking),
    }))
}

fn schedule_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let Some(classroom_id) = non_empty_str(params, "classroomId") else {
        return Err(validation_failed(
            "missing required fields: classroomId",
            Some(json!({ "missingFields": ["classroomId"] })),
        ));
    };
    let day = match non_empty_str(params, "dayOfWeek") {
        Some(raw) => match DayOfWeek::parse(&raw) {
            Some(d) => Some(d),
            None => {
                return Err(validation_failed(
                    format!("dayOfWeek must be a full day name, got \"{}\"", raw),
                    None,
                ))
            }
        },
        None => None,
    };

    let mut bookings = match day {
        Some(d) => {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {BOOKING_COLUMNS}
                     FROM bookings
                     WHERE classroom_id = ? AND day_of_week = ?"
                ))
                .map_err(db_query_failed)?;
            stmt.query_map((&classroom_id, d.as_str()), row_to_booking)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(db_query_failed)?
        }
        None => {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {BOOKING_COLUMNS} FROM bookings WHERE classroom_id = ?"
                ))
                .map_err(db_query_failed)?;
            stmt.query_map([&classroom_id], row_to_booking)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(db_query_failed)?
        }
    };

    // Weekday order, then start time. Unknown day strings sort last.
    bookings.sort_by_key(|b| {
        (
            DayOfWeek::parse(&b.day_of_week).map_or(7, DayOfWeek::index),
            b.start_min,
        )
    });

    Ok(json!({
        "bookings": bookings.iter().map(booking_to_json).collect::<Vec<_>>()
    }))
}

fn schedule_get(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let Some(id) = non_empty_str(params, "id") else {
        return Err(validation_failed(
            "missing required fields: id",
            Some(json!({ "missingFields": ["id"] })),
        ));
    };
    let booking = conn
        .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?"),
            [&id],
            row_to_booking,
        )
        .optional()
        .map_err(db_query_failed)?;
    match booking {
        Some(b) => Ok(json!({ "booking": booking_to_json(&b) })),
        None => Err(HandlerErr {
            code: "not_found",
            message: "booking not found".to_string(),
            details: Some(json!({ "id": id })),
        }),
    }
}

fn handle_schedule_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match schedule_submit(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_schedule_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match schedule_list(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_schedule_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match schedule_get(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedule.submit" => Some(handle_schedule_submit(state, req)),
        "schedule.list" => Some(handle_schedule_list(state, req)),
        "schedule.get" => Some(handle_schedule_get(state, req)),
        _ => None,
    }
}
