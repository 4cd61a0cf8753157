use crate::{
    AsValue, Command, Connection, Dialect, Direction, Driver, Executor, Item, ItemError, KeyCoherence,
    KeyFilter, KeySource, MappingError, Prevalidation, Record, Result, RowsAffected, TableDef,
    Transaction, Validator, Value, bind, bind_positional, strip_keyword,
};
use std::{
    fmt::{self, Display},
    future::Future,
};

/// What to do with an item. `Save` resolves to `Insert` or `Update` per item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrudAction {
    Save,
    Insert,
    Update,
    Delete,
}

impl Display for CrudAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CrudAction::Save => "save",
            CrudAction::Insert => "insert",
            CrudAction::Update => "update",
            CrudAction::Delete => "delete",
        })
    }
}

/// Key state of one item.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyClassification {
    /// Fields matching a declared primary key.
    pub total_key_fields: usize,
    /// Key fields holding the default value of their type.
    pub default_valued_key_fields: usize,
}

impl KeyClassification {
    /// `Save` becomes `Update` only when every key is present and none is at its default.
    pub fn resolve(&self, action: CrudAction) -> CrudAction {
        match action {
            CrudAction::Save if self.total_key_fields > 0 && self.default_valued_key_fields == 0 => {
                CrudAction::Update
            }
            CrudAction::Save => CrudAction::Insert,
            action => action,
        }
    }
}

/// A field of an item with its resolved column name.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    pub name: String,
    pub value: Value,
    pub is_key: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    pub fields: Vec<ResolvedField>,
    pub keys: KeyClassification,
}

/// A command ready to run for one item.
#[derive(Debug)]
pub struct Planned {
    pub action: CrudAction,
    pub command: Command,
    /// The command returns the generated key as a scalar.
    pub retrieves_key: bool,
}

/// Result of inserting an item whose key is generated by the database.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOutcome {
    pub key: i64,
    /// The item with its key, when the original could not be updated in place.
    pub item: Option<Record>,
}

/// Result of a batch.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Outcome of the first item, when it was inserted with a generated key.
    pub first_inserted: Option<InsertOutcome>,
    /// Items processed, those skipped by the validator excluded.
    pub processed: u64,
}

/// Access to an item of a batch, mutable or not.
pub trait ItemSlot: Send {
    type Target: Item;
    fn get(&self) -> &Self::Target;
    fn write_key(&mut self, name: &str, value: Value) -> Result<bool>;
}

impl<I: Item> ItemSlot for &I {
    type Target = I;
    fn get(&self) -> &I {
        self
    }
    fn write_key(&mut self, _name: &str, _value: Value) -> Result<bool> {
        Ok(false)
    }
}

impl<I: Item> ItemSlot for &mut I {
    type Target = I;
    fn get(&self) -> &I {
        self
    }
    fn write_key(&mut self, name: &str, value: Value) -> Result<bool> {
        (**self).write_key(name, value)
    }
}

/// Runs the commands of the resolver.
pub trait Runner: Send {
    fn scalar(&mut self, command: Command) -> impl Future<Output = Result<Option<Value>>> + Send;
    fn execute(&mut self, command: Command) -> impl Future<Output = Result<RowsAffected>> + Send;
}

/// Runs on an executor owned by the caller, never touching transactions.
pub struct Borrowed<'e, E: Executor>(pub &'e mut E);

impl<E: Executor> Runner for Borrowed<'_, E> {
    fn scalar(&mut self, command: Command) -> impl Future<Output = Result<Option<Value>>> + Send {
        self.0.scalar(command)
    }
    fn execute(&mut self, command: Command) -> impl Future<Output = Result<RowsAffected>> + Send {
        self.0.execute(command)
    }
}

/// Runs on a connection opened by the engine, wrapping a single command in a
/// transaction when the dialect requires it.
pub struct Owned<C: Connection>(pub C);

impl<C: Connection> Runner for Owned<C> {
    fn scalar(&mut self, command: Command) -> impl Future<Output = Result<Option<Value>>> + Send {
        async move {
            if !self.0.driver().dialect().requires_wrapping_transaction(&command) {
                return self.0.scalar(command).await;
            }
            let mut transaction = self.0.begin().await?;
            let result = transaction.scalar(command).await;
            settle(transaction, result).await
        }
    }
    fn execute(&mut self, command: Command) -> impl Future<Output = Result<RowsAffected>> + Send {
        async move {
            if !self.0.driver().dialect().requires_wrapping_transaction(&command) {
                return self.0.execute(command).await;
            }
            let mut transaction = self.0.begin().await?;
            let result = transaction.execute(command).await;
            settle(transaction, result).await
        }
    }
}

/// Commit on success, roll back on failure keeping the original error.
pub async fn settle<'c, T, R>(transaction: T, result: Result<R>) -> Result<R>
where
    T: Transaction<'c>,
{
    match result {
        Ok(value) => {
            transaction.commit().await?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback) = transaction.rollback().await {
                log::error!("{:#}", rollback);
            }
            Err(error)
        }
    }
}

/// The save/insert/update/delete decision engine of one table.
pub struct Resolver<'a> {
    pub table: &'a TableDef,
    pub dialect: &'a dyn Dialect,
    pub validator: &'a dyn Validator,
}

impl<'a> Resolver<'a> {
    pub fn new(table: &'a TableDef, dialect: &'a dyn Dialect, validator: &'a dyn Validator) -> Self {
        Self {
            table,
            dialect,
            validator,
        }
    }

    fn table_name(&self) -> String {
        self.table.name()
    }

    /// Resolve field names and count the key fields of an item. Positional
    /// values are mapped onto the declared primary key, in order.
    pub fn classify(&self, item: &(impl Item + ?Sized), index: usize) -> Result<Classified> {
        let name_values = item.name_values();
        let declared = self.table.primary_keys.len();
        let given = name_values.iter().filter(|v| v.name.is_none()).count();
        if given > declared {
            return Err(MappingError::TooManyKeyValues {
                table: self.table_name(),
                index,
                given,
                declared,
            }
            .raise());
        }
        let mut keys = KeyClassification::default();
        let mut position = 0;
        let mut fields = Vec::with_capacity(name_values.len());
        for field in name_values {
            let (name, is_key) = match field.name {
                Some(name) => {
                    let is_key = self.table.is_key(&name);
                    (name.into_owned(), is_key)
                }
                None => {
                    let name = self.table.primary_keys[position].clone();
                    position += 1;
                    (name, true)
                }
            };
            if is_key {
                keys.total_key_fields += 1;
                if field.value.is_default() {
                    keys.default_valued_key_fields += 1;
                }
            }
            fields.push(ResolvedField {
                name,
                value: field.value,
                is_key,
            });
        }
        Ok(Classified { fields, keys })
    }

    /// All or none of the keys present, all or none of them at default.
    pub fn check_coherence(&self, keys: &KeyClassification, index: usize) -> Result<()> {
        let declared = self.table.primary_keys.len();
        let reason = if keys.total_key_fields > declared {
            KeyCoherence::DuplicateKeys
        } else if keys.total_key_fields > 0 && keys.total_key_fields < declared {
            KeyCoherence::SomeKeysMissing
        } else if keys.default_valued_key_fields > 0
            && keys.default_valued_key_fields < keys.total_key_fields
        {
            KeyCoherence::SomeKeysDefault
        } else {
            return Ok(());
        };
        Err(MappingError::KeyCoherenceViolation {
            table: self.table_name(),
            index,
            reason,
        }
        .raise())
    }

    /// Build the command for one classified item.
    pub fn plan(&self, action: CrudAction, item: &Classified, index: usize) -> Result<Planned> {
        self.check_coherence(&item.keys, index)?;
        let action = item.keys.resolve(action);
        if matches!(action, CrudAction::Update | CrudAction::Delete) && !self.table.has_primary_key()
        {
            return Err(MappingError::NoPrimaryKey {
                table: self.table_name(),
                action,
            }
            .raise());
        }
        let dialect = self.dialect;
        let keys = &self.table.primary_keys;
        let expression = |field: &ResolvedField| {
            if field.value.is_null() {
                "NULL".to_string()
            } else {
                dialect.prefix_parameter_name(&field.name)
            }
        };
        // Values of key fields are always parameters, the others only when not NULL
        let args: Record = item
            .fields
            .iter()
            .filter(|v| v.is_key || !v.value.is_null())
            .map(|v| (v.name.clone(), v.value.clone()))
            .collect();
        let mut command = Command::default();
        let mut retrieves_key = false;
        match action {
            CrudAction::Insert | CrudAction::Save => {
                let generated = self.table.key_source.is_generated();
                let include_keys = !generated && item.keys.default_valued_key_fields == 0;
                let mut values: Vec<(String, String)> = item
                    .fields
                    .iter()
                    .filter(|v| !v.is_key || include_keys)
                    .map(|v| (v.name.clone(), expression(v)))
                    .collect();
                if let KeySource::Sequence(sequence) = &self.table.key_source {
                    let mut nextval = String::new();
                    dialect.write_nextval(&mut nextval, sequence);
                    values.push((keys[0].clone(), nextval));
                }
                if values.is_empty() {
                    return Err(MappingError::NothingToWrite {
                        table: self.table_name(),
                        action,
                        index,
                    }
                    .raise());
                }
                dialect.write_insert(&mut command.sql, &self.table.table, &values);
                let retrieval = match &self.table.key_source {
                    KeySource::Manual => None,
                    KeySource::Identity(expression) => Some(expression.clone()),
                    KeySource::Sequence(sequence) => {
                        let mut currval = String::new();
                        dialect.write_currval(&mut currval, sequence);
                        Some(currval)
                    }
                };
                if let Some(retrieval) = retrieval {
                    command.sql.push_str("\nSELECT ");
                    command.sql.push_str(&retrieval);
                    command.sql.push_str(dialect.from_no_table());
                    command.sql.push(';');
                    command.sql = dialect.wrap_command_block(command.sql);
                    retrieves_key = true;
                }
                let filter = if include_keys {
                    KeyFilter::All
                } else {
                    KeyFilter::NoKeys
                };
                bind(&mut command, dialect, &args, Direction::Input, filter, keys)?;
            }
            CrudAction::Update => {
                let assignments: Vec<(String, String)> = item
                    .fields
                    .iter()
                    .filter(|v| !v.is_key)
                    .map(|v| (v.name.clone(), expression(v)))
                    .collect();
                let condition = self.key_condition(item, action)?;
                if assignments.is_empty() {
                    return Err(MappingError::NothingToWrite {
                        table: self.table_name(),
                        action,
                        index,
                    }
                    .raise());
                }
                dialect.write_update(&mut command.sql, &self.table.table, &assignments, &condition);
                bind(&mut command, dialect, &args, Direction::Input, KeyFilter::NoKeys, keys)?;
                bind(&mut command, dialect, &args, Direction::Input, KeyFilter::KeysOnly, keys)?;
            }
            CrudAction::Delete => {
                let condition = self.key_condition(item, action)?;
                dialect.write_delete(&mut command.sql, &self.table.table, &condition);
                bind(&mut command, dialect, &args, Direction::Input, KeyFilter::KeysOnly, keys)?;
            }
        }
        Ok(Planned {
            action,
            command,
            retrieves_key,
        })
    }

    fn key_condition(&self, item: &Classified, action: CrudAction) -> Result<String> {
        let mut condition = String::new();
        crate::separated_by(
            &mut condition,
            item.fields.iter().filter(|v| v.is_key),
            |out, v| {
                out.push_str(&v.name);
                out.push_str(" = ");
                out.push_str(&self.dialect.prefix_parameter_name(&v.name));
            },
            " AND ",
        );
        if condition.is_empty() {
            return Err(MappingError::MissingPredicate {
                table: self.table_name(),
                action,
            }
            .raise());
        }
        Ok(condition)
    }

    /// Run the validator over every item before anything is executed.
    pub fn prevalidate<'i>(
        &self,
        items: impl IntoIterator<Item = &'i dyn Item>,
        action: CrudAction,
    ) -> Result<()> {
        let mode = self.validator.prevalidation();
        if mode == Prevalidation::Off {
            return Ok(());
        }
        let mut errors = Vec::new();
        for (index, item) in items.into_iter().enumerate() {
            let messages = self.validator.is_valid(item, action);
            let failed = !messages.is_empty();
            errors.extend(
                messages
                    .into_iter()
                    .map(|message| ItemError { index, message }),
            );
            if failed && mode == Prevalidation::ToFirstFailure {
                break;
            }
        }
        if errors.is_empty() {
            return Ok(());
        }
        Err(MappingError::ValidationFailure {
            table: self.table_name(),
            action,
            errors,
        }
        .raise())
    }

    /// Act on every item in order, stopping at the first failure.
    pub async fn act_on_items<R, S>(
        &self,
        runner: &mut R,
        action: CrudAction,
        items: impl IntoIterator<Item = S>,
    ) -> Result<Outcome>
    where
        R: Runner,
        S: ItemSlot,
    {
        let mut slots: Vec<S> = items.into_iter().collect();
        self.prevalidate(slots.iter().map(|v| v.get() as &dyn Item), action)?;
        let mut outcome = Outcome::default();
        for (index, slot) in slots.iter_mut().enumerate() {
            if !self.validator.performing(slot.get(), action) {
                log::debug!("Item {} of `{}` skipped by the validator", index, self.table.table);
                continue;
            }
            let inserted = self.act_on_item(runner, action, slot, index).await?;
            if index == 0 {
                outcome.first_inserted = inserted;
            }
            self.validator.performed(slot.get(), action);
            outcome.processed += 1;
        }
        Ok(outcome)
    }

    async fn act_on_item<R: Runner, S: ItemSlot>(
        &self,
        runner: &mut R,
        action: CrudAction,
        slot: &mut S,
        index: usize,
    ) -> Result<Option<InsertOutcome>> {
        let classified = self.classify(slot.get(), index)?;
        let planned = self.plan(action, &classified, index)?;
        log::debug!(
            "{} item {} of `{}`: {}",
            planned.action,
            index,
            self.table.table,
            planned.command
        );
        if planned.retrieves_key {
            let value = runner.scalar(planned.command).await?;
            let key = self.generated_key(value)?;
            let name = &self.table.primary_keys[0];
            let item = if slot.write_key(name, Value::Int64(Some(key)))? {
                None
            } else {
                let mut record: Record = classified
                    .fields
                    .into_iter()
                    .map(|v| (v.name, v.value))
                    .collect();
                record.set(name.clone(), key);
                Some(record)
            };
            return Ok(Some(InsertOutcome { key, item }));
        }
        let affected = runner.execute(planned.command).await?.rows_affected;
        if affected != 1 {
            return Err(MappingError::AffectedRowCountMismatch {
                table: self.table_name(),
                action: planned.action,
                index,
                affected,
            }
            .raise());
        }
        Ok(None)
    }

    fn generated_key(&self, value: Option<Value>) -> Result<i64> {
        let value = self.dialect.get_value(value.unwrap_or_default());
        i64::try_from_value(value).map_err(|error| {
            let error = error.context(format!(
                "The insert into `{}` did not return a usable generated key",
                self.table.table
            ));
            log::error!("{:#}", error);
            error
        })
    }

    /// Key fields of `key`, which must carry every declared primary key.
    pub fn key_record(&self, key: &(impl Item + ?Sized), action: CrudAction) -> Result<Record> {
        if !self.table.has_primary_key() {
            return Err(MappingError::NoPrimaryKey {
                table: self.table_name(),
                action,
            }
            .raise());
        }
        let classified = self.classify(key, 0)?;
        let declared = self.table.primary_keys.len();
        if classified.keys.total_key_fields != declared {
            return Err(MappingError::KeyCoherenceViolation {
                table: self.table_name(),
                index: 0,
                reason: if classified.keys.total_key_fields > declared {
                    KeyCoherence::DuplicateKeys
                } else {
                    KeyCoherence::SomeKeysMissing
                },
            }
            .raise());
        }
        Ok(classified
            .fields
            .into_iter()
            .filter(|v| v.is_key)
            .map(|v| (v.name, v.value))
            .collect())
    }

    /// `UPDATE .. SET <non key fields of partial> WHERE <condition>`.
    pub fn plan_update_using(
        &self,
        partial: &(impl Item + ?Sized),
        condition: &str,
        args: &[Value],
    ) -> Result<Command> {
        let condition = strip_keyword(condition, "WHERE");
        if condition.is_empty() {
            return Err(MappingError::MissingPredicate {
                table: self.table_name(),
                action: CrudAction::Update,
            }
            .raise());
        }
        let mut command = Command::default();
        bind_positional(&mut command, self.dialect, args)?;
        self.write_partial_update(&mut command, partial, condition)?;
        Ok(command)
    }

    /// `UPDATE .. SET <non key fields of partial> WHERE <keys>`.
    pub fn plan_update_from(
        &self,
        partial: &(impl Item + ?Sized),
        key: &(impl Item + ?Sized),
    ) -> Result<Command> {
        let key = self.key_record(key, CrudAction::Update)?;
        let mut command = Command::default();
        let condition = self.table.key_predicate(self.dialect);
        self.write_partial_update(&mut command, partial, &condition)?;
        bind(
            &mut command,
            self.dialect,
            &key,
            Direction::Input,
            KeyFilter::KeysOnly,
            &self.table.primary_keys,
        )?;
        Ok(command)
    }

    fn write_partial_update(
        &self,
        command: &mut Command,
        partial: &(impl Item + ?Sized),
        condition: &str,
    ) -> Result<()> {
        let mut assignments = Vec::new();
        let mut args = Record::new();
        for field in partial.name_values() {
            let Some(name) = field.name else {
                continue;
            };
            if self.table.is_key(&name) {
                continue;
            }
            let expression = if field.value.is_null() {
                "NULL".to_string()
            } else {
                args.set(name.to_string(), field.value);
                self.dialect.prefix_parameter_name(&name)
            };
            assignments.push((name.into_owned(), expression));
        }
        if assignments.is_empty() {
            return Err(MappingError::NothingToWrite {
                table: self.table_name(),
                action: CrudAction::Update,
                index: 0,
            }
            .raise());
        }
        self.dialect
            .write_update(&mut command.sql, &self.table.table, &assignments, condition);
        bind(
            command,
            self.dialect,
            &args,
            Direction::Input,
            KeyFilter::NoKeys,
            &self.table.primary_keys,
        )
    }

    /// `DELETE .. WHERE <condition>`, `"1=1"` is needed to delete everything.
    pub fn plan_delete_where(&self, condition: &str, args: &[Value]) -> Result<Command> {
        let condition = strip_keyword(condition, "WHERE");
        if condition.is_empty() {
            return Err(MappingError::MissingPredicate {
                table: self.table_name(),
                action: CrudAction::Delete,
            }
            .raise());
        }
        let mut command = Command::default();
        self.dialect
            .write_delete(&mut command.sql, &self.table.table, condition);
        bind_positional(&mut command, self.dialect, args)?;
        Ok(command)
    }

    /// `DELETE .. WHERE <keys>`.
    pub fn plan_delete_by_key(&self, key: &(impl Item + ?Sized)) -> Result<Command> {
        let key = self.key_record(key, CrudAction::Delete)?;
        let mut command = Command::default();
        let condition = self.table.key_predicate(self.dialect);
        self.dialect
            .write_delete(&mut command.sql, &self.table.table, &condition);
        bind(
            &mut command,
            self.dialect,
            &key,
            Direction::Input,
            KeyFilter::KeysOnly,
            &self.table.primary_keys,
        )?;
        Ok(command)
    }
}
