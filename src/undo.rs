//! In-memory change log over entity-store mutations.
//!
//! Every successful insert/update/delete pushes an [`UndoRecord`] carrying
//! typed row snapshots. The log is bounded: once [`MAX_UNDO`] records are
//! held, pushing another silently evicts the oldest. Consumption is LIFO.
//! The log lives in memory only and is cleared on restart.
//!
//! The single stdin loop is the only writer, so the log needs no locking;
//! wrap it in a mutex before sharing it across threads.

use crate::store::{CategoryRow, ClassRow, GradeRow, StudentRow, TitleRow};

pub const MAX_UNDO: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Insert,
    Update,
    Delete,
}

impl OpKind {
    pub fn label(self) -> &'static str {
        match self {
            OpKind::Insert => "insert",
            OpKind::Update => "update",
            OpKind::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Class,
    Student,
    Category,
    Title,
    Grade,
}

impl EntityKind {
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Class => "class",
            EntityKind::Student => "student",
            EntityKind::Category => "category",
            EntityKind::Title => "assignment title",
            EntityKind::Grade => "grade",
        }
    }
}

/// A full row snapshot, tagged by entity kind so reversal can pattern-match
/// instead of rebuilding SQL from dynamic field names.
#[derive(Debug, Clone)]
pub enum RowImage {
    Class(ClassRow),
    Student(StudentRow),
    Category(CategoryRow),
    Title(TitleRow),
    Grade(GradeRow),
}

impl RowImage {
    pub fn kind(&self) -> EntityKind {
        match self {
            RowImage::Class(_) => EntityKind::Class,
            RowImage::Student(_) => EntityKind::Student,
            RowImage::Category(_) => EntityKind::Category,
            RowImage::Title(_) => EntityKind::Title,
            RowImage::Grade(_) => EntityKind::Grade,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            RowImage::Class(r) => &r.id,
            RowImage::Student(r) => &r.id,
            RowImage::Category(r) => &r.id,
            RowImage::Title(r) => &r.id,
            RowImage::Grade(r) => &r.id,
        }
    }
}

/// One reversible past mutation.
#[derive(Debug, Clone)]
pub struct UndoRecord {
    pub op: OpKind,
    pub kind: EntityKind,
    pub record_id: String,
    pub before: Option<RowImage>,
    pub after: Option<RowImage>,
}

impl UndoRecord {
    pub fn insert(after: RowImage) -> Self {
        Self {
            op: OpKind::Insert,
            kind: after.kind(),
            record_id: after.id().to_string(),
            before: None,
            after: Some(after),
        }
    }

    pub fn update(before: RowImage, after: RowImage) -> Self {
        Self {
            op: OpKind::Update,
            kind: before.kind(),
            record_id: before.id().to_string(),
            before: Some(before),
            after: Some(after),
        }
    }

    pub fn delete(before: RowImage) -> Self {
        Self {
            op: OpKind::Delete,
            kind: before.kind(),
            record_id: before.id().to_string(),
            before: Some(before),
            after: None,
        }
    }

    pub fn describe(&self) -> String {
        format!("undo {} {}", self.kind.label(), self.op.label())
    }
}

#[derive(Debug, Default)]
pub struct UndoLog {
    stack: Vec<UndoRecord>,
}

impl UndoLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, evicting the oldest entry once the cap is exceeded.
    pub fn record(&mut self, rec: UndoRecord) {
        self.stack.push(rec);
        if self.stack.len() > MAX_UNDO {
            self.stack.remove(0);
        }
    }

    pub fn pop(&mut self) -> Option<UndoRecord> {
        self.stack.pop()
    }

    /// Put a popped record back on top after a failed reversal, so the undo
    /// is not silently lost.
    pub fn restore(&mut self, rec: UndoRecord) {
        self.stack.push(rec);
    }

    pub fn can_undo(&self) -> bool {
        !self.stack.is_empty()
    }

    pub fn describe_last(&self) -> Option<String> {
        self.stack.last().map(UndoRecord::describe)
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}
