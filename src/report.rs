use rusqlite::{params_from_iter, types::Value, Connection};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectProgress {
    pub subject_id: String,
    pub subject_code: String,
    pub subject_name: String,
    pub total_sessions: i64,
    pub done_sessions: i64,
    pub canceled_sessions: i64,
    pub upcoming_sessions: i64,
    pub total_periods: i64,
    pub done_periods: i64,
    pub progress_ratio: f64,
    pub progress_text: String,
}

#[derive(Debug, Clone, Default)]
struct Tally {
    subject_id: String,
    subject_name: String,
    total: i64,
    done: i64,
    canceled: i64,
    open: i64,
    total_periods: i64,
    done_periods: i64,
}

/// Per-subject progress counters for a lecturer's calendar rows.
///
/// `done` covers both regular and makeup completions. Upcoming is
/// recomputed as `total - done - canceled` whenever the per-status tally
/// does not add up (rows in an unrecognized status, historically possible
/// after imports); the arithmetic-consistent value wins.
pub fn teaching_progress(
    conn: &Connection,
    lecturer_id: &str,
    semester: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
) -> rusqlite::Result<Vec<SubjectProgress>> {
    let mut sql = String::from(
        "SELECT sub.id, sub.code, sub.name, s.status, COALESCE(t.period_count, 1)
         FROM schedules s
         JOIN assignments a ON a.id = s.assignment_id
         JOIN subjects sub ON sub.id = a.subject_id
         LEFT JOIN timeslots t ON t.id = s.timeslot_id
         WHERE a.lecturer_id = ?",
    );
    let mut binds: Vec<Value> = vec![Value::from(lecturer_id.to_string())];
    if let Some(semester) = semester {
        sql.push_str(" AND a.semester = ?");
        binds.push(Value::from(semester.to_string()));
    }
    if let Some(from) = from {
        sql.push_str(" AND s.session_date >= ?");
        binds.push(Value::from(from.to_string()));
    }
    if let Some(to) = to {
        sql.push_str(" AND s.session_date <= ?");
        binds.push(Value::from(to.to_string()));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut by_subject: BTreeMap<String, Tally> = BTreeMap::new();
    for (subject_id, code, name, status, periods) in rows {
        let tally = by_subject.entry(code).or_default();
        tally.subject_id = subject_id;
        tally.subject_name = name;
        tally.total += 1;
        tally.total_periods += periods;
        match status.as_str() {
            "done" | "makeup_done" => {
                tally.done += 1;
                tally.done_periods += periods;
            }
            "canceled" => tally.canceled += 1,
            "planned" | "teaching" | "makeup_planned" => tally.open += 1,
            _ => {}
        }
    }

    let mut out = Vec::with_capacity(by_subject.len());
    for (code, tally) in by_subject {
        let mut upcoming = tally.open;
        if tally.done + tally.canceled + upcoming != tally.total {
            upcoming = tally.total - tally.done - tally.canceled;
        }
        let ratio = if tally.total > 0 {
            ((tally.done as f64 / tally.total as f64) * 100.0).round() / 100.0
        } else {
            0.0
        };
        out.push(SubjectProgress {
            subject_id: tally.subject_id,
            subject_code: code,
            subject_name: tally.subject_name,
            total_sessions: tally.total,
            done_sessions: tally.done,
            canceled_sessions: tally.canceled,
            upcoming_sessions: upcoming,
            total_periods: tally.total_periods,
            done_periods: tally.done_periods,
            progress_ratio: ratio,
            progress_text: format!("{}/{} buoi", tally.done, tally.total),
        });
    }
    Ok(out)
}
