use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;

use crate::error::AppError;
use crate::models::assignment::{AssignmentStatus, ShiftAssignment};
use crate::models::attendance::Attendance;
use crate::models::driver::{Driver, DriverStatus};
use crate::models::load::{Load, LoadStatus};

/// Everything the engine needs to persist for one assignment, minus the
/// fields the store fills in itself (row id, statuses, audit timestamps).
pub struct AssignmentDraft {
    pub driver_id: i64,
    pub load_id: i64,
    pub load_ref: String,
    pub assigned_date: DateTime<Utc>,
    pub suitability_score: f64,
    pub overload_score: f64,
    pub is_override: bool,
}

/// In-memory persistence gateway. Single-record reads and writes go straight
/// to the entity maps; the multi-record write of an assignment goes through
/// [`Store::commit_assignment`] so it lands as one unit. Callers that need
/// check-then-commit consistency hold [`Store::lock_assignments`] across both.
pub struct Store {
    drivers: DashMap<i64, Driver>,
    loads: DashMap<i64, Load>,
    attendance: DashMap<i64, Attendance>,
    assignments: DashMap<i64, ShiftAssignment>,
    next_driver_id: AtomicI64,
    next_load_id: AtomicI64,
    next_attendance_id: AtomicI64,
    next_assignment_id: AtomicI64,
    assignment_lock: Mutex<()>,
}

impl Store {
    pub fn new() -> Self {
        Self {
            drivers: DashMap::new(),
            loads: DashMap::new(),
            attendance: DashMap::new(),
            assignments: DashMap::new(),
            next_driver_id: AtomicI64::new(1),
            next_load_id: AtomicI64::new(1),
            next_attendance_id: AtomicI64::new(1),
            next_assignment_id: AtomicI64::new(1),
            assignment_lock: Mutex::new(()),
        }
    }

    // --- drivers ---

    pub fn allocate_driver_id(&self) -> i64 {
        self.next_driver_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn get_driver(&self, driver_id: i64) -> Option<Driver> {
        self.drivers.get(&driver_id).map(|d| d.clone())
    }

    pub fn save_driver(&self, driver: Driver) {
        self.drivers.insert(driver.driver_id, driver);
    }

    pub fn drivers(&self) -> Vec<Driver> {
        self.drivers.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn active_drivers(&self) -> Vec<Driver> {
        self.drivers
            .iter()
            .filter(|entry| entry.value().status == DriverStatus::Active)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn driver_count(&self) -> usize {
        self.drivers.len()
    }

    // --- loads ---

    pub fn allocate_load_id(&self) -> i64 {
        self.next_load_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn get_load(&self, load_id: i64) -> Option<Load> {
        self.loads.get(&load_id).map(|l| l.clone())
    }

    pub fn save_load(&self, load: Load) {
        self.loads.insert(load.load_id, load);
    }

    pub fn remove_load(&self, load_id: i64) -> Option<Load> {
        self.loads.remove(&load_id).map(|(_, load)| load)
    }

    pub fn loads(&self) -> Vec<Load> {
        self.loads.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn pending_loads(&self) -> Vec<Load> {
        self.loads
            .iter()
            .filter(|entry| entry.value().status == LoadStatus::Pending)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn pending_load_count(&self) -> usize {
        self.loads
            .iter()
            .filter(|entry| entry.value().status == LoadStatus::Pending)
            .count()
    }

    pub fn load_count(&self) -> usize {
        self.loads.len()
    }

    /// Highest existing reference with the given day prefix, used to continue
    /// the per-day `LD-YYYYMMDD-NNN` sequence.
    pub fn last_load_ref_with_prefix(&self, prefix: &str) -> Option<String> {
        self.loads
            .iter()
            .map(|entry| entry.value().load_ref.clone())
            .filter(|load_ref| load_ref.starts_with(prefix))
            .max()
    }

    // --- attendance ---

    pub fn allocate_attendance_id(&self) -> i64 {
        self.next_attendance_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn save_attendance(&self, attendance: Attendance) {
        self.attendance.insert(attendance.attendance_id, attendance);
    }

    pub fn attendance_rows(&self) -> Vec<Attendance> {
        self.attendance.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn attendance_on(&self, driver_id: i64, date: NaiveDate) -> Option<Attendance> {
        self.attendance
            .iter()
            .find(|entry| entry.value().driver_id == driver_id && entry.value().date == date)
            .map(|entry| entry.value().clone())
    }

    /// Attendance rows for a driver with `from <= date < to`.
    pub fn attendance_in_range(&self, driver_id: i64, from: NaiveDate, to: NaiveDate) -> Vec<Attendance> {
        self.attendance
            .iter()
            .filter(|entry| {
                let row = entry.value();
                row.driver_id == driver_id && row.date >= from && row.date < to
            })
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Most recent recorded check-out across the driver's whole history.
    pub fn last_checkout(&self, driver_id: i64) -> Option<DateTime<Utc>> {
        self.attendance
            .iter()
            .filter(|entry| entry.value().driver_id == driver_id)
            .filter_map(|entry| entry.value().check_out_time)
            .max()
    }

    // --- assignments ---

    pub fn get_assignment(&self, assignment_id: i64) -> Option<ShiftAssignment> {
        self.assignments.get(&assignment_id).map(|a| a.clone())
    }

    pub fn save_assignment(&self, assignment: ShiftAssignment) {
        self.assignments.insert(assignment.assignment_id, assignment);
    }

    pub fn assignments(&self) -> Vec<ShiftAssignment> {
        self.assignments.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn assignment_count(&self) -> usize {
        self.assignments.len()
    }

    /// A driver's assignments dated `from <= assigned_date < to` (date-bucketed
    /// in UTC), each joined with its load where the load still exists. With
    /// `exclude_completed`, completed assignments are filtered out.
    pub fn assignments_in_range(
        &self,
        driver_id: i64,
        from: NaiveDate,
        to: NaiveDate,
        exclude_completed: bool,
    ) -> Vec<(ShiftAssignment, Option<Load>)> {
        self.assignments
            .iter()
            .filter(|entry| {
                let row = entry.value();
                let day = row.assigned_date.date_naive();
                row.driver_id == driver_id
                    && day >= from
                    && day < to
                    && !(exclude_completed && row.status == AssignmentStatus::Completed)
            })
            .map(|entry| {
                let row = entry.value().clone();
                let load = row.load_id.and_then(|id| self.get_load(id));
                (row, load)
            })
            .collect()
    }

    /// Today's still-open workload for a driver: assignments dated `date`
    /// whose status is not COMPLETED.
    pub fn active_assignments_on(&self, driver_id: i64, date: NaiveDate) -> Vec<(ShiftAssignment, Option<Load>)> {
        self.assignments_in_range(driver_id, date, date + chrono::Duration::days(1), true)
    }

    // --- atomic assignment commit ---

    /// Guards the window between an eligibility/overload check and the commit
    /// that depends on it. Engine code holds this across [`Store::commit_assignment`].
    pub fn lock_assignments(&self) -> MutexGuard<'_, ()> {
        self.assignment_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Writes one assignment as a unit: the new row, the load's transition to
    /// ASSIGNED, and the driver's last-assignment stamp. Everything is
    /// validated before the first write, so a failure leaves no partial state.
    pub fn commit_assignment(
        &self,
        draft: AssignmentDraft,
        now: DateTime<Utc>,
    ) -> Result<ShiftAssignment, AppError> {
        let mut load = self
            .loads
            .get_mut(&draft.load_id)
            .ok_or_else(|| AppError::NotFound("Load not found".to_string()))?;
        if load.status != LoadStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "Load is not pending (current status: {})",
                load.status
            )));
        }

        let mut driver = self
            .drivers
            .get_mut(&draft.driver_id)
            .ok_or_else(|| AppError::NotFound("Driver not found".to_string()))?;

        let assignment = ShiftAssignment {
            assignment_id: self.next_assignment_id.fetch_add(1, Ordering::SeqCst),
            driver_id: draft.driver_id,
            load_id: Some(draft.load_id),
            load_ref: draft.load_ref,
            assigned_date: draft.assigned_date,
            status: AssignmentStatus::Assigned,
            suitability_score: draft.suitability_score,
            overload_score: draft.overload_score,
            is_override: draft.is_override,
            created_at: now,
        };

        load.status = LoadStatus::Assigned;
        load.assigned_driver_id = Some(draft.driver_id);
        load.assigned_at = Some(now);

        driver.last_assignment_date = Some(now);
        driver.updated_at = now;

        self.assignments.insert(assignment.assignment_id, assignment.clone());
        Ok(assignment)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::{AssignmentDraft, Store};
    use crate::models::driver::{DayOfWeek, Driver, DriverStatus, VehicleType};
    use crate::models::load::{Load, LoadStatus, Priority};

    fn seed_driver(store: &Store) -> i64 {
        let now = Utc.with_ymd_and_hms(2025, 3, 12, 8, 0, 0).unwrap();
        let driver_id = store.allocate_driver_id();
        store.save_driver(Driver {
            driver_id,
            name: "Asha".to_string(),
            phone: "9000000001".to_string(),
            email: None,
            region: "North".to_string(),
            vehicle_type: VehicleType::Van,
            weekly_off: DayOfWeek::Sunday,
            status: DriverStatus::Active,
            fatigue_score: 0.0,
            consecutive_days: 0,
            last_assignment_date: None,
            created_at: now,
            updated_at: now,
        });
        driver_id
    }

    fn seed_load(store: &Store, status: LoadStatus) -> i64 {
        let now = Utc.with_ymd_and_hms(2025, 3, 12, 8, 0, 0).unwrap();
        let load_id = store.allocate_load_id();
        store.save_load(Load {
            load_id,
            load_ref: format!("LD-20250312-{load_id:03}"),
            region: "North".to_string(),
            stops: 12,
            estimated_hours: 3.0,
            estimated_distance: 40.0,
            priority: Priority::Medium,
            status,
            assigned_driver_id: None,
            assigned_at: None,
            created_at: now,
        });
        load_id
    }

    #[test]
    fn commit_writes_assignment_load_and_driver_together() {
        let store = Store::new();
        let driver_id = seed_driver(&store);
        let load_id = seed_load(&store, LoadStatus::Pending);
        let now = Utc.with_ymd_and_hms(2025, 3, 12, 9, 0, 0).unwrap();

        let assignment = store
            .commit_assignment(
                AssignmentDraft {
                    driver_id,
                    load_id,
                    load_ref: "LD-20250312-001".to_string(),
                    assigned_date: now,
                    suitability_score: 88.5,
                    overload_score: 0.31,
                    is_override: false,
                },
                now,
            )
            .unwrap();

        let load = store.get_load(load_id).unwrap();
        assert_eq!(load.status, LoadStatus::Assigned);
        assert_eq!(load.assigned_driver_id, Some(driver_id));
        assert_eq!(load.assigned_at, Some(now));

        let driver = store.get_driver(driver_id).unwrap();
        assert_eq!(driver.last_assignment_date, Some(now));

        assert_eq!(store.get_assignment(assignment.assignment_id).unwrap().suitability_score, 88.5);
    }

    #[test]
    fn commit_refuses_non_pending_load_without_writing() {
        let store = Store::new();
        let driver_id = seed_driver(&store);
        let load_id = seed_load(&store, LoadStatus::Assigned);
        let now = Utc.with_ymd_and_hms(2025, 3, 12, 9, 0, 0).unwrap();

        let result = store.commit_assignment(
            AssignmentDraft {
                driver_id,
                load_id,
                load_ref: "LD-20250312-001".to_string(),
                assigned_date: now,
                suitability_score: 88.5,
                overload_score: 0.31,
                is_override: false,
            },
            now,
        );

        assert!(result.is_err());
        assert_eq!(store.assignment_count(), 0);
        assert!(store.get_driver(driver_id).unwrap().last_assignment_date.is_none());
    }

    #[test]
    fn attendance_range_is_half_open() {
        let store = Store::new();
        let driver_id = seed_driver(&store);
        let created = Utc.with_ymd_and_hms(2025, 3, 12, 8, 0, 0).unwrap();

        for day in 9..=12 {
            let attendance_id = store.allocate_attendance_id();
            store.save_attendance(crate::models::attendance::Attendance {
                attendance_id,
                driver_id,
                date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
                check_in_time: Some(created),
                check_out_time: None,
                total_hours: 8.0,
                is_absent: false,
                is_overtime: false,
                created_at: created,
            });
        }

        let from = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        let to = NaiveDate::from_ymd_opt(2025, 3, 12).unwrap();
        let rows = store.attendance_in_range(driver_id, from, to);
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.date < to));
    }
}
