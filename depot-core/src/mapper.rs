use crate::{
    AcceptAll, AsValue, Borrowed, ColumnDescriptor, Command, Connection, CrudAction, Dialect,
    Direction, Driver, Error, Executor, FromRow, InsertOutcome, Item, ItemSlot, KeyFilter,
    MappingError, MappingOptions, Outcome, Owned, Params, Record, Resolver, Result, RowLabeled,
    Runner, TableDef, Validator, Value, bind, bind_positional, extract_results, find_column,
    materialize, materialize_sets, reverse_ordering, settle, strip_keyword,
    stream::{Stream, TryStreamExt},
};
use async_stream::try_stream;
use std::{borrow::Cow, pin::pin, slice, sync::Arc};

/// Run `$body` on a connection opened for this call, inside a transaction
/// when the dialect requires one for `$command`.
macro_rules! with_connection {
    ($mapper:expr, $command:expr, |$executor:ident| $body:expr) => {{
        let mut connection = $mapper.connect().await?;
        if $mapper.dialect().requires_wrapping_transaction(&$command) {
            let mut transaction = connection.begin().await?;
            let result = {
                let $executor = &mut transaction;
                $body.await
            };
            settle(transaction, result).await
        } else {
            let $executor = &mut connection;
            $body.await
        }
    }};
}

/// Options of a SELECT over the table of a [`DataMapper`].
#[derive(Default, Debug, Clone)]
pub struct Select {
    /// Projection, the table default when empty.
    pub columns: String,
    /// Predicate, a leading `WHERE` is accepted.
    pub condition: String,
    /// Ordering, a leading `ORDER BY` is accepted.
    pub order_by: String,
    pub limit: Option<u32>,
    /// Positional arguments, referenced as `@0`, `@1`, … (with the dialect prefix).
    pub args: Vec<Value>,
    /// Named arguments.
    pub named: Record,
}

impl Select {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }
    pub fn condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = condition.into();
        self
    }
    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = order_by.into();
        self
    }
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }
    pub fn args(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.args.extend(values);
        self
    }
    pub fn named(mut self, name: impl Into<Cow<'static, str>>, value: impl Into<Value>) -> Self {
        self.named.set(name, value);
        self
    }
}

/// A page request, pages are 1-based.
#[derive(Debug, Clone)]
pub struct Paging {
    pub select: Select,
    pub page_size: u64,
    pub current_page: u64,
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            select: Select::default(),
            page_size: 20,
            current_page: 1,
        }
    }
}

impl Paging {
    pub fn new(select: Select) -> Self {
        Self {
            select,
            ..Default::default()
        }
    }
    pub fn page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }
    pub fn current_page(mut self, current_page: u64) -> Self {
        self.current_page = current_page;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PagedResults<T> {
    pub items: Vec<T>,
    pub total_records: u64,
    pub total_pages: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Count,
    Sum,
    Max,
    Min,
    Avg,
}

impl Aggregate {
    pub fn function(&self) -> &'static str {
        match self {
            Aggregate::Count => "COUNT",
            Aggregate::Sum => "SUM",
            Aggregate::Max => "MAX",
            Aggregate::Min => "MIN",
            Aggregate::Avg => "AVG",
        }
    }
}

/// A read operation selected by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    All,
    /// First row, `descending` reverses the ordering.
    One { descending: bool },
    Aggregate(Aggregate),
}

const VERBS: &[(&str, Verb)] = &[
    ("first", Verb::One { descending: false }),
    ("last", Verb::One { descending: true }),
    ("get", Verb::One { descending: false }),
    ("find", Verb::One { descending: false }),
    ("single", Verb::One { descending: false }),
    ("count", Verb::Aggregate(Aggregate::Count)),
    ("sum", Verb::Aggregate(Aggregate::Sum)),
    ("max", Verb::Aggregate(Aggregate::Max)),
    ("min", Verb::Aggregate(Aggregate::Min)),
    ("avg", Verb::Aggregate(Aggregate::Avg)),
];

impl Verb {
    /// Match `name` against the known verb prefixes, ignoring case. Unknown
    /// names read all the rows.
    pub fn lookup(name: &str) -> Verb {
        let name = name.to_ascii_lowercase();
        VERBS
            .iter()
            .find(|(prefix, _)| name.starts_with(prefix))
            .map(|(_, verb)| *verb)
            .unwrap_or(Verb::All)
    }
}

/// Result of [`DataMapper::dispatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched<T> {
    Rows(Vec<T>),
    One(Option<T>),
    Scalar(Option<Value>),
}

/// Maps one table (or none, for raw queries) of a database.
///
/// Every operation comes in two flavors: `op` opens a connection for the call
/// and owns it until the returned future completes, `op_on` runs on an
/// executor supplied by the caller (a connection or a transaction) and never
/// begins, commits or rolls back anything.
pub struct DataMapper<D: Driver> {
    driver: D,
    url: Cow<'static, str>,
    table: Option<TableDef>,
    validator: Arc<dyn Validator>,
    options: MappingOptions,
}

pub struct DataMapperBuilder<D: Driver> {
    driver: D,
    url: Cow<'static, str>,
    table: String,
    primary_key: String,
    sequence: Option<String>,
    columns: String,
    validator: Arc<dyn Validator>,
    options: MappingOptions,
}

impl<D: Driver> DataMapperBuilder<D> {
    pub fn url(mut self, url: impl Into<Cow<'static, str>>) -> Self {
        self.url = url.into();
        self
    }
    /// Table name, optionally qualified as `owner.table`.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }
    /// Comma separated primary key fields.
    pub fn primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }
    /// Sequence name on sequence based dialects, identity retrieval override
    /// otherwise. An empty string disables generated keys.
    pub fn sequence(mut self, sequence: impl Into<String>) -> Self {
        self.sequence = Some(sequence.into());
        self
    }
    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }
    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }
    pub fn options(mut self, options: MappingOptions) -> Self {
        self.options = options;
        self
    }
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.options.case_sensitive = case_sensitive;
        self
    }
    pub fn strict_columns(mut self, strict_columns: bool) -> Self {
        self.options.strict_columns = strict_columns;
        self
    }

    pub fn build(self) -> Result<DataMapper<D>> {
        let table = if self.table.trim().is_empty() {
            None
        } else {
            Some(TableDef::new(
                self.driver.dialect().as_dyn(),
                &self.table,
                &self.primary_key,
                &self.columns,
                self.sequence.as_deref(),
            )?)
        };
        Ok(DataMapper {
            driver: self.driver,
            url: self.url,
            table,
            validator: self.validator,
            options: self.options,
        })
    }
}

impl<D: Driver> DataMapper<D> {
    pub fn builder(driver: D) -> DataMapperBuilder<D> {
        DataMapperBuilder {
            driver,
            url: Cow::Borrowed(""),
            table: String::new(),
            primary_key: String::new(),
            sequence: None,
            columns: String::new(),
            validator: Arc::new(AcceptAll),
            options: MappingOptions::default(),
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn dialect(&self) -> &D::Dialect {
        self.driver.dialect()
    }

    pub fn table_def(&self) -> Option<&TableDef> {
        self.table.as_ref()
    }

    pub fn options(&self) -> &MappingOptions {
        &self.options
    }

    /// Open a new connection to the configured url.
    pub async fn connect(&self) -> Result<D::Connection> {
        self.driver.connect(self.url.clone()).await
    }

    fn table(&self, operation: &str) -> Result<&TableDef> {
        self.table.as_ref().ok_or_else(|| {
            MappingError::NoTableName {
                operation: operation.to_string(),
            }
            .raise()
        })
    }

    fn resolver(&self, action: CrudAction) -> Result<Resolver<'_>> {
        Ok(Resolver::new(
            self.table(&action.to_string())?,
            self.dialect().as_dyn(),
            self.validator.as_ref(),
        ))
    }

    async fn act<R: Runner, S: ItemSlot>(
        &self,
        runner: &mut R,
        action: CrudAction,
        items: impl IntoIterator<Item = S>,
    ) -> Result<Outcome> {
        self.resolver(action)?
            .act_on_items(runner, action, items)
            .await
    }

    /// Insert items without a usable key, update the others. Generated keys
    /// are written back into the items. Returns the number of items processed.
    pub async fn save<I: Item>(&self, items: &mut [I]) -> Result<u64> {
        let mut runner = Owned(self.connect().await?);
        let outcome = self.act(&mut runner, CrudAction::Save, items.iter_mut()).await?;
        Ok(outcome.processed)
    }

    pub async fn save_on<E: Executor, I: Item>(&self, executor: &mut E, items: &mut [I]) -> Result<u64> {
        let outcome = self
            .act(&mut Borrowed(executor), CrudAction::Save, items.iter_mut())
            .await?;
        Ok(outcome.processed)
    }

    /// Insert the items, returning the generated key of the first one.
    pub async fn insert<I: Item>(&self, items: &mut [I]) -> Result<Option<InsertOutcome>> {
        let mut runner = Owned(self.connect().await?);
        let outcome = self.act(&mut runner, CrudAction::Insert, items.iter_mut()).await?;
        Ok(outcome.first_inserted)
    }

    pub async fn insert_on<E: Executor, I: Item>(
        &self,
        executor: &mut E,
        items: &mut [I],
    ) -> Result<Option<InsertOutcome>> {
        let outcome = self
            .act(&mut Borrowed(executor), CrudAction::Insert, items.iter_mut())
            .await?;
        Ok(outcome.first_inserted)
    }

    pub async fn insert_one<I: Item>(&self, item: &mut I) -> Result<Option<InsertOutcome>> {
        self.insert(slice::from_mut(item)).await
    }

    pub async fn update<I: Item>(&self, items: &[I]) -> Result<u64> {
        let mut runner = Owned(self.connect().await?);
        let outcome = self.act(&mut runner, CrudAction::Update, items).await?;
        Ok(outcome.processed)
    }

    pub async fn update_on<E: Executor, I: Item>(&self, executor: &mut E, items: &[I]) -> Result<u64> {
        let outcome = self
            .act(&mut Borrowed(executor), CrudAction::Update, items)
            .await?;
        Ok(outcome.processed)
    }

    pub async fn delete<I: Item>(&self, items: &[I]) -> Result<u64> {
        let mut runner = Owned(self.connect().await?);
        let outcome = self.act(&mut runner, CrudAction::Delete, items).await?;
        Ok(outcome.processed)
    }

    pub async fn delete_on<E: Executor, I: Item>(&self, executor: &mut E, items: &[I]) -> Result<u64> {
        let outcome = self
            .act(&mut Borrowed(executor), CrudAction::Delete, items)
            .await?;
        Ok(outcome.processed)
    }

    async fn affected<R: Runner>(runner: &mut R, command: Command) -> Result<u64> {
        log::debug!("{}", command);
        Ok(runner.execute(command).await?.rows_affected)
    }

    /// Set the non-key fields of `partial` on every row matching `condition`.
    pub async fn update_using(
        &self,
        partial: &(impl Item + ?Sized),
        condition: &str,
        args: &[Value],
    ) -> Result<u64> {
        let command = self
            .resolver(CrudAction::Update)?
            .plan_update_using(partial, condition, args)?;
        Self::affected(&mut Owned(self.connect().await?), command).await
    }

    pub async fn update_using_on<E: Executor>(
        &self,
        executor: &mut E,
        partial: &(impl Item + ?Sized),
        condition: &str,
        args: &[Value],
    ) -> Result<u64> {
        let command = self
            .resolver(CrudAction::Update)?
            .plan_update_using(partial, condition, args)?;
        Self::affected(&mut Borrowed(executor), command).await
    }

    /// Set the non-key fields of `partial` on the row identified by `key`.
    pub async fn update_from(
        &self,
        partial: &(impl Item + ?Sized),
        key: &(impl Item + ?Sized),
    ) -> Result<u64> {
        let command = self
            .resolver(CrudAction::Update)?
            .plan_update_from(partial, key)?;
        Self::affected(&mut Owned(self.connect().await?), command).await
    }

    pub async fn update_from_on<E: Executor>(
        &self,
        executor: &mut E,
        partial: &(impl Item + ?Sized),
        key: &(impl Item + ?Sized),
    ) -> Result<u64> {
        let command = self
            .resolver(CrudAction::Update)?
            .plan_update_from(partial, key)?;
        Self::affected(&mut Borrowed(executor), command).await
    }

    /// Delete the rows matching `condition`, which cannot be empty.
    pub async fn delete_where(&self, condition: &str, args: &[Value]) -> Result<u64> {
        let command = self
            .resolver(CrudAction::Delete)?
            .plan_delete_where(condition, args)?;
        Self::affected(&mut Owned(self.connect().await?), command).await
    }

    pub async fn delete_where_on<E: Executor>(
        &self,
        executor: &mut E,
        condition: &str,
        args: &[Value],
    ) -> Result<u64> {
        let command = self
            .resolver(CrudAction::Delete)?
            .plan_delete_where(condition, args)?;
        Self::affected(&mut Borrowed(executor), command).await
    }

    pub async fn delete_by_key(&self, key: &(impl Item + ?Sized)) -> Result<u64> {
        let command = self.resolver(CrudAction::Delete)?.plan_delete_by_key(key)?;
        Self::affected(&mut Owned(self.connect().await?), command).await
    }

    pub async fn delete_by_key_on<E: Executor>(
        &self,
        executor: &mut E,
        key: &(impl Item + ?Sized),
    ) -> Result<u64> {
        let command = self.resolver(CrudAction::Delete)?.plan_delete_by_key(key)?;
        Self::affected(&mut Borrowed(executor), command).await
    }

    fn bind_select_args(&self, command: &mut Command, select: &Select) -> Result<()> {
        let dialect = self.dialect().as_dyn();
        bind_positional(command, dialect, &select.args)?;
        bind(
            command,
            dialect,
            &select.named,
            Direction::Input,
            KeyFilter::All,
            &[],
        )
    }

    fn select_command(&self, select: &Select) -> Result<Command> {
        let table = self.table("select")?;
        let columns = match select.columns.trim() {
            "" => table.columns.as_str(),
            v => v,
        };
        let mut command = Command::default();
        self.dialect().write_select(
            &mut command.sql,
            columns,
            &table.table,
            strip_keyword(&select.condition, "WHERE"),
            strip_keyword(&select.order_by, "ORDER BY"),
            select.limit,
        );
        self.bind_select_args(&mut command, select)?;
        Ok(command)
    }

    fn command_with_args(&self, command: impl Into<Command>, args: &[Value]) -> Result<Command> {
        let mut command = command.into();
        bind_positional(&mut command, self.dialect().as_dyn(), args)?;
        Ok(command)
    }

    /// Rows of `command` on a connection opened for the stream.
    fn rows(&self, command: Result<Command>) -> impl Stream<Item = Result<RowLabeled>> + Send + '_ {
        try_stream! {
            let command = command?;
            log::debug!("{}", command);
            let mut connection = self.connect().await?;
            if self.dialect().requires_wrapping_transaction(&command) {
                let mut transaction = connection.begin().await?;
                let mut failure = None;
                {
                    let mut rows = pin!(transaction.fetch(command));
                    loop {
                        match rows.try_next().await {
                            Ok(Some(row)) => yield row,
                            Ok(None) => break,
                            Err(error) => {
                                failure = Some(error);
                                break;
                            }
                        }
                    }
                }
                settle(transaction, failure.map_or(Ok(()), Err)).await?;
            } else {
                let mut rows = pin!(connection.fetch(command));
                while let Some(row) = rows.try_next().await? {
                    yield row;
                }
            }
        }
    }

    fn rows_on<'e, E: Executor>(
        executor: &'e mut E,
        command: Result<Command>,
    ) -> impl Stream<Item = Result<RowLabeled>> + Send + 'e {
        try_stream! {
            let command = command?;
            log::debug!("{}", command);
            let mut rows = pin!(executor.fetch(command));
            while let Some(row) = rows.try_next().await? {
                yield row;
            }
        }
    }

    /// Stream the rows of the table matching `select`.
    pub fn all<T: FromRow + 'static>(
        &self,
        select: Select,
    ) -> impl Stream<Item = Result<T>> + Send + '_ {
        materialize(self.rows(self.select_command(&select)), self.options)
    }

    pub fn all_on<'e, T: FromRow + 'static, E: Executor>(
        &'e self,
        executor: &'e mut E,
        select: Select,
    ) -> impl Stream<Item = Result<T>> + Send + 'e {
        materialize(
            Self::rows_on(executor, self.select_command(&select)),
            self.options,
        )
    }

    /// First row matching `select`.
    pub async fn single<T: FromRow + 'static>(&self, select: Select) -> Result<Option<T>> {
        let mut rows = pin!(self.all(select.limit(1)));
        rows.try_next().await
    }

    pub async fn single_on<T: FromRow + 'static, E: Executor>(
        &self,
        executor: &mut E,
        select: Select,
    ) -> Result<Option<T>> {
        let mut rows = pin!(self.all_on(executor, select.limit(1)));
        rows.try_next().await
    }

    fn key_select(&self, key: &(impl Item + ?Sized)) -> Result<Select> {
        let resolver = self.resolver(CrudAction::Save)?;
        let named = resolver.key_record(key, CrudAction::Save)?;
        Ok(Select {
            condition: self.table("select")?.key_predicate(self.dialect().as_dyn()),
            named,
            ..Default::default()
        })
    }

    /// The row identified by `key`, positional values map onto the primary key in order.
    pub async fn single_by_key<T: FromRow + 'static>(
        &self,
        key: &(impl Item + ?Sized),
    ) -> Result<Option<T>> {
        self.single(self.key_select(key)?).await
    }

    pub async fn single_by_key_on<T: FromRow + 'static, E: Executor>(
        &self,
        executor: &mut E,
        key: &(impl Item + ?Sized),
    ) -> Result<Option<T>> {
        let select = self.key_select(key)?;
        self.single_on(executor, select).await
    }

    /// Stream the rows of arbitrary SQL.
    pub fn query<T: FromRow + 'static>(
        &self,
        command: impl Into<Command>,
        args: &[Value],
    ) -> impl Stream<Item = Result<T>> + Send + '_ {
        materialize(
            self.rows(self.command_with_args(command, args)),
            self.options,
        )
    }

    pub fn query_on<'e, T: FromRow + 'static, E: Executor>(
        &'e self,
        executor: &'e mut E,
        command: impl Into<Command>,
        args: &[Value],
    ) -> impl Stream<Item = Result<T>> + Send + 'e {
        materialize(
            Self::rows_on(executor, self.command_with_args(command, args)),
            self.options,
        )
    }

    /// Rows grouped by result set, one `Vec` per set.
    pub async fn query_multiple<T: FromRow>(
        &self,
        command: impl Into<Command>,
        args: &[Value],
    ) -> Result<Vec<Vec<T>>> {
        let command = self.command_with_args(command, args)?;
        with_connection!(self, command, |executor| self.run_multiple(executor, command))
    }

    pub async fn query_multiple_on<T: FromRow, E: Executor>(
        &self,
        executor: &mut E,
        command: impl Into<Command>,
        args: &[Value],
    ) -> Result<Vec<Vec<T>>> {
        let command = self.command_with_args(command, args)?;
        self.run_multiple(executor, command).await
    }

    async fn run_multiple<T: FromRow, E: Executor>(
        &self,
        executor: &mut E,
        command: Command,
    ) -> Result<Vec<Vec<T>>> {
        log::debug!("{}", command);
        materialize_sets(executor.run(command), self.options).await
    }

    /// First column of the first row.
    pub async fn scalar(&self, command: impl Into<Command>, args: &[Value]) -> Result<Option<Value>> {
        let command = self.command_with_args(command, args)?;
        log::debug!("{}", command);
        Owned(self.connect().await?).scalar(command).await
    }

    pub async fn scalar_on<E: Executor>(
        &self,
        executor: &mut E,
        command: impl Into<Command>,
        args: &[Value],
    ) -> Result<Option<Value>> {
        let command = self.command_with_args(command, args)?;
        log::debug!("{}", command);
        executor.scalar(command).await
    }

    /// Run a statement, returning the number of affected rows.
    pub async fn execute(&self, command: impl Into<Command>, args: &[Value]) -> Result<u64> {
        let command = self.command_with_args(command, args)?;
        Self::affected(&mut Owned(self.connect().await?), command).await
    }

    pub async fn execute_on<E: Executor>(
        &self,
        executor: &mut E,
        command: impl Into<Command>,
        args: &[Value],
    ) -> Result<u64> {
        let command = self.command_with_args(command, args)?;
        Self::affected(&mut Borrowed(executor), command).await
    }

    fn params_command(
        &self,
        command: impl Into<Command>,
        args: &[Value],
        params: &Params<'_>,
    ) -> Result<Command> {
        let mut command = self.command_with_args(command, args)?;
        params.bind(&mut command, self.dialect().as_dyn())?;
        Ok(command)
    }

    /// Run a statement or procedure with directional parameters, returning the
    /// final values of the non-input ones.
    pub async fn execute_with_params(
        &self,
        command: impl Into<Command>,
        args: &[Value],
        params: &Params<'_>,
    ) -> Result<Record> {
        let command = self.params_command(command, args, params)?;
        with_connection!(self, command, |executor| self.run_with_params(executor, command))
    }

    pub async fn execute_with_params_on<E: Executor>(
        &self,
        executor: &mut E,
        command: impl Into<Command>,
        args: &[Value],
        params: &Params<'_>,
    ) -> Result<Record> {
        let command = self.params_command(command, args, params)?;
        self.run_with_params(executor, command).await
    }

    async fn run_with_params<E: Executor>(&self, executor: &mut E, command: Command) -> Result<Record> {
        log::debug!("{}", command);
        let (_, outputs) = executor.execute_with_outputs(command).await?;
        Ok(extract_results(self.dialect().as_dyn(), &outputs))
    }

    fn aggregate_command(&self, function: &str, select: &Select) -> Result<Command> {
        let table = self.table("aggregate")?;
        let mut command = Command::default();
        self.dialect().write_aggregate(
            &mut command.sql,
            function,
            select.columns.trim(),
            &table.table,
            strip_keyword(&select.condition, "WHERE"),
        );
        self.bind_select_args(&mut command, select)?;
        Ok(command)
    }

    /// `function(columns)` over the rows matching `condition`.
    pub async fn aggregate(
        &self,
        function: &str,
        columns: &str,
        condition: &str,
        args: &[Value],
    ) -> Result<Option<Value>> {
        let select = Select::new()
            .columns(columns)
            .condition(condition)
            .args(args.iter().cloned());
        let command = self.aggregate_command(function, &select)?;
        log::debug!("{}", command);
        Owned(self.connect().await?).scalar(command).await
    }

    pub async fn aggregate_on<E: Executor>(
        &self,
        executor: &mut E,
        function: &str,
        columns: &str,
        condition: &str,
        args: &[Value],
    ) -> Result<Option<Value>> {
        let select = Select::new()
            .columns(columns)
            .condition(condition)
            .args(args.iter().cloned());
        let command = self.aggregate_command(function, &select)?;
        log::debug!("{}", command);
        executor.scalar(command).await
    }

    pub async fn count(&self, condition: &str, args: &[Value]) -> Result<u64> {
        let value = self.aggregate("COUNT", "*", condition, args).await?;
        Ok(u64::try_from_value(value.unwrap_or_default())?)
    }

    pub async fn count_on<E: Executor>(
        &self,
        executor: &mut E,
        condition: &str,
        args: &[Value],
    ) -> Result<u64> {
        let value = self
            .aggregate_on(executor, "COUNT", "*", condition, args)
            .await?;
        Ok(u64::try_from_value(value.unwrap_or_default())?)
    }

    fn paging_commands(&self, paging: &Paging) -> Result<(Command, Command)> {
        let table = self.table("page")?;
        let select = &paging.select;
        let size = paging.page_size.max(1);
        let page = paging.current_page.max(1);
        let order_by = match strip_keyword(&select.order_by, "ORDER BY") {
            "" => table.primary_key_list(),
            v => v.to_string(),
        };
        let columns = match select.columns.trim() {
            "" => table.columns.as_str(),
            v => v,
        };
        let queries = self.dialect().write_paging(
            columns,
            &table.table,
            strip_keyword(&select.condition, "WHERE"),
            &order_by,
            size,
            (page - 1) * size,
        );
        let mut count = Command::new(queries.count);
        self.bind_select_args(&mut count, select)?;
        let mut rows = Command::new(queries.page);
        self.bind_select_args(&mut rows, select)?;
        Ok((count, rows))
    }

    /// One page of the rows matching the select, with the totals. The
    /// ordering defaults to the primary key.
    pub async fn paged<T: FromRow + 'static>(&self, paging: &Paging) -> Result<PagedResults<T>> {
        let (count, rows) = self.paging_commands(paging)?;
        let size = paging.page_size.max(1);
        with_connection!(self, rows, |executor| self.run_paged(executor, count, rows, size))
    }

    pub async fn paged_on<T: FromRow + 'static, E: Executor>(
        &self,
        executor: &mut E,
        paging: &Paging,
    ) -> Result<PagedResults<T>> {
        let (count, rows) = self.paging_commands(paging)?;
        self.run_paged(executor, count, rows, paging.page_size.max(1))
            .await
    }

    async fn run_paged<T: FromRow + 'static, E: Executor>(
        &self,
        executor: &mut E,
        count: Command,
        rows: Command,
        size: u64,
    ) -> Result<PagedResults<T>> {
        log::debug!("{}", count);
        let total_records = match executor.scalar(count).await? {
            Some(value) if !value.is_null() => u64::try_from_value(value)?,
            _ => 0,
        };
        log::debug!("{}", rows);
        let items = materialize(executor.fetch(rows), self.options)
            .try_collect()
            .await?;
        Ok(PagedResults {
            items,
            total_records,
            total_pages: total_records.div_ceil(size),
        })
    }

    /// Run a [`Verb`] found through [`Verb::lookup`].
    pub async fn dispatch<T: FromRow + 'static>(
        &self,
        verb: Verb,
        select: Select,
    ) -> Result<Dispatched<T>> {
        let mut connection = self.connect().await?;
        self.dispatch_on(&mut connection, verb, select).await
    }

    pub async fn dispatch_on<T: FromRow + 'static, E: Executor>(
        &self,
        executor: &mut E,
        verb: Verb,
        select: Select,
    ) -> Result<Dispatched<T>> {
        Ok(match verb {
            Verb::All => Dispatched::Rows(self.all_on(executor, select).try_collect().await?),
            Verb::One { descending } => {
                let mut select = select;
                let mut order_by = strip_keyword(&select.order_by, "ORDER BY").to_string();
                if order_by.is_empty() {
                    order_by = self.table("select")?.primary_key_list();
                }
                if descending {
                    order_by = reverse_ordering(&order_by);
                }
                select.order_by = order_by;
                Dispatched::One(self.single_on(executor, select).await?)
            }
            Verb::Aggregate(aggregate) => {
                let command = self.aggregate_command(aggregate.function(), &select)?;
                log::debug!("{}", command);
                Dispatched::Scalar(executor.scalar(command).await?)
            }
        })
    }

    /// Columns of the table, loaded on first use and cached afterwards.
    pub async fn columns(&self) -> Result<Arc<[ColumnDescriptor]>> {
        let table = self.table("load the schema")?;
        if let Some(columns) = table.schema().loaded() {
            return Ok(columns);
        }
        let mut connection = self.connect().await?;
        table.schema().columns(&table.table, &mut connection).await
    }

    pub async fn columns_on<E: Executor>(&self, executor: &mut E) -> Result<Arc<[ColumnDescriptor]>> {
        let table = self.table("load the schema")?;
        table.schema().columns(&table.table, executor).await
    }

    fn find_column(&self, columns: &[ColumnDescriptor], name: &str) -> Result<ColumnDescriptor> {
        find_column(columns, name).cloned().ok_or_else(|| {
            let error = Error::msg(format!(
                "Table `{}` has no column named `{}`",
                self.table.as_ref().map(TableDef::name).unwrap_or_default(),
                name
            ));
            log::error!("{:#}", error);
            error
        })
    }

    /// Descriptor of a column, matched ignoring case.
    pub async fn column_info(&self, name: &str) -> Result<ColumnDescriptor> {
        let columns = self.columns().await?;
        self.find_column(&columns, name)
    }

    pub async fn column_info_on<E: Executor>(
        &self,
        executor: &mut E,
        name: &str,
    ) -> Result<ColumnDescriptor> {
        let columns = self.columns_on(executor).await?;
        self.find_column(&columns, name)
    }

    /// Default value of a column, as interpreted by the dialect.
    pub async fn column_default(&self, name: &str) -> Result<Value> {
        let column = self.column_info(name).await?;
        Ok(self.dialect().column_default(&column))
    }

    pub async fn column_default_on<E: Executor>(&self, executor: &mut E, name: &str) -> Result<Value> {
        let column = self.column_info_on(executor, name).await?;
        Ok(self.dialect().column_default(&column))
    }

    fn record_from(
        &self,
        columns: &[ColumnDescriptor],
        source: &(impl Item + ?Sized),
        add_missing_as_defaults: bool,
    ) -> Record {
        let values = source.name_values();
        let mut result = Record::with_capacity(columns.len());
        for column in columns {
            let given = values.iter().find(|v| {
                v.name
                    .as_deref()
                    .is_some_and(|name| name.eq_ignore_ascii_case(&column.name))
            });
            if let Some(given) = given {
                result.set(column.name.clone(), given.value.clone());
            } else if add_missing_as_defaults {
                result.set(column.name.clone(), self.dialect().column_default(column));
            }
        }
        result
    }

    /// A record with the columns of the table, taking the values of `source`
    /// where names match and, optionally, the column defaults elsewhere.
    pub async fn new_from(
        &self,
        source: &(impl Item + ?Sized),
        add_missing_as_defaults: bool,
    ) -> Result<Record> {
        let columns = self.columns().await?;
        Ok(self.record_from(&columns, source, add_missing_as_defaults))
    }

    pub async fn new_from_on<E: Executor>(
        &self,
        executor: &mut E,
        source: &(impl Item + ?Sized),
        add_missing_as_defaults: bool,
    ) -> Result<Record> {
        let columns = self.columns_on(executor).await?;
        Ok(self.record_from(&columns, source, add_missing_as_defaults))
    }
}
