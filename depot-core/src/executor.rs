use crate::{
    Command, Driver, Parameter, QueryResult, Result, RowLabeled, RowsAffected, Value,
    stream::{Stream, StreamExt, TryStreamExt},
};
use std::{future::Future, pin::pin};

pub trait Executor: Send {
    type Driver: Driver;

    fn driver(&self) -> &Self::Driver;

    /// General method to send any command and return any result type (rows,
    /// affected counts or output parameters).
    fn run(&mut self, command: Command) -> impl Stream<Item = Result<QueryResult>> + Send;

    /// Execute the command and returns the rows.
    fn fetch(&mut self, command: Command) -> impl Stream<Item = Result<RowLabeled>> + Send {
        self.run(command).filter_map(|v| async move {
            match v {
                Ok(QueryResult::Row(v)) => Some(Ok(v)),
                Err(e) => Some(Err(e)),
                _ => None,
            }
        })
    }

    /// Execute the command and return the total number of rows affected.
    fn execute(&mut self, command: Command) -> impl Future<Output = Result<RowsAffected>> + Send {
        self.run(command)
            .filter_map(|v| async move {
                match v {
                    Ok(QueryResult::Affected(v)) => Some(Ok(v)),
                    Err(e) => Some(Err(e)),
                    _ => None,
                }
            })
            .try_collect()
    }

    /// First column of the first row, `None` when the command returns no rows.
    fn scalar(&mut self, command: Command) -> impl Future<Output = Result<Option<Value>>> + Send {
        async move {
            let mut rows = pin!(self.fetch(command));
            let row = rows.try_next().await?;
            Ok(row.and_then(|row| row.values.into_vec().into_iter().next()))
        }
    }

    /// Execute the command to completion, returning the affected rows and the
    /// final values of the non-input parameters.
    fn execute_with_outputs(
        &mut self,
        command: Command,
    ) -> impl Future<Output = Result<(RowsAffected, Vec<Parameter>)>> + Send {
        async move {
            let mut affected = RowsAffected::default();
            let mut outputs = Vec::new();
            let mut results = pin!(self.run(command));
            while let Some(result) = results.try_next().await? {
                match result {
                    QueryResult::Affected(v) => affected.extend([v]),
                    QueryResult::Outputs(v) => outputs.extend(v),
                    QueryResult::ResultSet(..) | QueryResult::Row(..) => {}
                }
            }
            Ok((affected, outputs))
        }
    }
}
