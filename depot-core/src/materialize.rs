use crate::{
    MappingError, QueryResult, Record, Result, Row, RowLabeled, RowNames, Shape,
    stream::{Stream, StreamExt},
};
use async_stream::try_stream;
use std::{any, pin::pin, sync::Arc};

/// How columns are matched to the fields of a [`Shape`].
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingOptions {
    /// Match column names to field names exactly instead of ignoring case.
    pub case_sensitive: bool,
    /// A column without a matching field is an error instead of being skipped.
    pub strict_columns: bool,
}

/// A type rows can be materialized into.
///
/// The plan is computed once per result set from its column labels, then
/// reused for every row of that set.
pub trait FromRow: Sized + Send {
    type Plan: Send + Sync;

    fn plan(labels: &RowNames, options: &MappingOptions) -> Result<Self::Plan>;

    /// `row` is the ordinal of the row within its result set, for error reporting.
    fn from_row(plan: &Self::Plan, values: Row, row: usize) -> Result<Self>;
}

impl FromRow for Record {
    type Plan = RowNames;

    fn plan(labels: &RowNames, _options: &MappingOptions) -> Result<Self::Plan> {
        Ok(labels.clone())
    }

    fn from_row(plan: &Self::Plan, values: Row, _row: usize) -> Result<Self> {
        Ok(RowLabeled::new(plan.clone(), values).into())
    }
}

/// Column ordinal → field position of a [`Shape`], `None` for skipped columns.
#[derive(Debug)]
pub struct ShapePlan {
    labels: RowNames,
    fields: Box<[Option<usize>]>,
}

impl ShapePlan {
    pub fn new<T: Shape>(labels: &RowNames, options: &MappingOptions) -> Result<Self> {
        let index = T::index();
        let fields = labels
            .iter()
            .map(|label| {
                let field = index.lookup(label, options.case_sensitive);
                if field.is_none() {
                    if options.strict_columns {
                        return Err(MappingError::UnmappedColumn {
                            column: label.clone(),
                            target: any::type_name::<T>(),
                        }
                        .raise());
                    }
                    log::trace!(
                        "Column `{}` has no field in `{}`, skipped",
                        label,
                        any::type_name::<T>()
                    );
                }
                Ok(field)
            })
            .collect::<Result<_>>()?;
        Ok(Self {
            labels: labels.clone(),
            fields,
        })
    }

    pub fn build<T: Shape>(&self, values: Row, row: usize) -> Result<T> {
        let mut result = T::default();
        let fields = T::fields();
        for (i, value) in values.into_vec().into_iter().enumerate() {
            let Some(Some(position)) = self.fields.get(i) else {
                continue;
            };
            let field = &fields[*position];
            if value.is_null() && !field.nullable {
                continue;
            }
            if let Err(error) = (field.set)(&mut result, value) {
                return Err(MappingError::MaterializationTypeMismatch {
                    column: self.labels[i].clone(),
                    row,
                }
                .wrap(error));
            }
        }
        Ok(result)
    }
}

/// Turn a stream of rows into a lazy stream of `T`.
pub fn materialize<T, S>(rows: S, options: MappingOptions) -> impl Stream<Item = Result<T>> + Send
where
    T: FromRow,
    S: Stream<Item = Result<RowLabeled>> + Send,
{
    try_stream! {
        let mut rows = pin!(rows);
        let mut plan: Option<(RowNames, T::Plan)> = None;
        let mut index = 0;
        while let Some(row) = rows.next().await {
            let row = row?;
            let same_set = matches!(&plan, Some((labels, _)) if Arc::ptr_eq(labels, &row.labels));
            if !same_set {
                plan = Some((row.labels.clone(), T::plan(&row.labels, &options)?));
                index = 0;
            }
            let Some((_, current)) = &plan else {
                continue;
            };
            let item = T::from_row(current, row.values, index)?;
            index += 1;
            yield item;
        }
    }
}

/// Collect the rows grouped by result set.
///
/// A set starts at each [`QueryResult::ResultSet`] marker, so empty sets keep
/// their position. Rows with new labels and no marker also start a set.
pub async fn materialize_sets<T, S>(results: S, options: MappingOptions) -> Result<Vec<Vec<T>>>
where
    T: FromRow,
    S: Stream<Item = Result<QueryResult>> + Send,
{
    let mut results = pin!(results);
    let mut sets: Vec<Vec<T>> = Vec::new();
    let mut plan: Option<(RowNames, T::Plan)> = None;
    while let Some(result) = results.next().await {
        let row = match result? {
            QueryResult::ResultSet(labels) => {
                plan = Some((labels.clone(), T::plan(&labels, &options)?));
                sets.push(Vec::new());
                continue;
            }
            QueryResult::Row(row) => row,
            QueryResult::Affected(..) | QueryResult::Outputs(..) => continue,
        };
        let same_set = matches!(&plan, Some((labels, _)) if Arc::ptr_eq(labels, &row.labels));
        if !same_set {
            plan = Some((row.labels.clone(), T::plan(&row.labels, &options)?));
            sets.push(Vec::new());
        }
        let (Some((_, current)), Some(set)) = (&plan, sets.last_mut()) else {
            continue;
        };
        let item = T::from_row(current, row.values, set.len())?;
        set.push(item);
    }
    Ok(sets)
}
