//! Dependency ordering of the commands of one save operation.
//!
//! Rows are ordered by the foreign keys between them:
//! - A dependent row is inserted or updated after the principal row it now
//!   references is inserted.
//! - A dependent row is deleted or updated away before the principal row it
//!   used to reference is deleted.
//!
//! - A row deleted and inserted again under the same primary key is
//!   deleted first.
//!
//! Dependencies are found row by row through [`ForeignKeyValueFactory`]
//! tokens, not table by table, so rows of a self-referencing table are
//! ordered correctly.

use crate::command::{EntityState, ModificationCommand};
use crate::config::UpdateConfig;
use crate::foreign_key::{ForeignKeyValueFactory, KeyValueIndex};
use crate::identity_map::RowIdentityMap;
use crate::metadata::Table;
use rowmap_core::{Error, MetadataErrorKind, Result};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// Directed dependencies between commands, by submission index.
#[derive(Debug, Default)]
pub struct CommandGraph {
    successors: Vec<Vec<usize>>,
    in_degree: Vec<usize>,
    edges: HashSet<(usize, usize)>,
}

impl CommandGraph {
    /// Create a graph of `nodes` unconnected commands.
    pub fn new(nodes: usize) -> Self {
        Self {
            successors: vec![Vec::new(); nodes],
            in_degree: vec![0; nodes],
            edges: HashSet::new(),
        }
    }

    /// Require `before` to be written before `after`.
    ///
    /// Self-edges and duplicates are ignored.
    pub fn add_edge(&mut self, before: usize, after: usize) {
        if before == after || !self.edges.insert((before, after)) {
            return;
        }
        self.successors[before].push(after);
        self.in_degree[after] += 1;
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Topologically sort, preferring submission order among ready commands.
    ///
    /// On a cycle, returns the indices that could not be ordered.
    pub fn sort(&self) -> std::result::Result<Vec<usize>, Vec<usize>> {
        let mut in_degree = self.in_degree.clone();
        let mut ready: BTreeSet<usize> = (0..in_degree.len())
            .filter(|&node| in_degree[node] == 0)
            .collect();
        let mut order = Vec::with_capacity(in_degree.len());

        while let Some(node) = ready.pop_first() {
            order.push(node);
            for &next in &self.successors[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() == in_degree.len() {
            Ok(order)
        } else {
            Err((0..in_degree.len())
                .filter(|&node| in_degree[node] > 0)
                .collect())
        }
    }
}

/// Orders the commands of one save operation by their row dependencies.
#[derive(Debug)]
pub struct CommandOrderer<'m> {
    tables: HashMap<&'m str, &'m Table>,
    sensitive_data_logging: bool,
}

impl<'m> CommandOrderer<'m> {
    /// Create an orderer over the tables of the model.
    pub fn new(tables: &'m [Table], config: &UpdateConfig) -> Self {
        Self {
            tables: tables.iter().map(|t| (t.name(), t)).collect(),
            sensitive_data_logging: config.sensitive_data_logging,
        }
    }

    /// Order `commands` so that every foreign key holds after each write.
    ///
    /// Duplicate writes to the same row fail with an identity conflict; a
    /// dependency cycle fails with [`Error::CycleDetected`].
    #[tracing::instrument(level = "debug", skip(self, commands), fields(commands = commands.len()))]
    pub fn order<C: ModificationCommand>(&self, commands: &[Arc<C>]) -> Result<Vec<Arc<C>>> {
        for command in commands {
            self.table(command.table_name())?;
        }
        let deleted = self.check_identities(commands)?;

        let mut graph = self.build_graph(commands)?;
        Self::link_reinserts(commands, &deleted, &mut graph);
        tracing::debug!(edges = graph.edge_count(), "Built command dependency graph");

        match graph.sort() {
            Ok(order) => Ok(order
                .into_iter()
                .map(|index| Arc::clone(&commands[index]))
                .collect()),
            Err(stuck) => {
                let mut tables: Vec<String> = Vec::new();
                for index in stuck {
                    let table = commands[index].table_name();
                    if !tables.iter().any(|t| t == table) {
                        tables.push(table.to_string());
                    }
                }
                tracing::warn!(tables = ?tables, "Dependency cycle between pending writes");
                Err(Error::CycleDetected { tables })
            }
        }
    }

    fn table(&self, name: &str) -> Result<&'m Table> {
        self.tables.get(name).copied().ok_or_else(|| {
            Error::metadata(
                MetadataErrorKind::UnknownTable,
                format!("no table '{name}' in the model"),
            )
        })
    }

    /// Each row may be written at most once, and deleted at most once.
    ///
    /// Returns the identity maps of the deleted rows, by table.
    fn check_identities<C: ModificationCommand>(
        &self,
        commands: &[Arc<C>],
    ) -> Result<HashMap<&'m str, RowIdentityMap<C>>> {
        let mut live: HashMap<&str, RowIdentityMap<C>> = HashMap::new();
        let mut deleted: HashMap<&str, RowIdentityMap<C>> = HashMap::new();
        for command in commands {
            let maps = match command.entity_state() {
                EntityState::Deleted => &mut deleted,
                EntityState::Added | EntityState::Modified => &mut live,
            };
            let table = self.table(command.table_name())?;
            let map = match maps.entry(table.name()) {
                std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
                std::collections::hash_map::Entry::Vacant(e) => e.insert(RowIdentityMap::new(
                    table.primary_key(),
                    self.sensitive_data_logging,
                )?),
            };
            map.add(Arc::clone(command))?;
        }
        Ok(deleted)
    }

    fn link_reinserts<C: ModificationCommand>(
        commands: &[Arc<C>],
        deleted: &HashMap<&'m str, RowIdentityMap<C>>,
        graph: &mut CommandGraph,
    ) {
        if deleted.is_empty() {
            return;
        }
        let positions: HashMap<*const C, usize> = commands
            .iter()
            .enumerate()
            .map(|(index, command)| (Arc::as_ptr(command), index))
            .collect();
        for (index, command) in commands.iter().enumerate() {
            if !matches!(command.entity_state(), EntityState::Added) {
                continue;
            }
            let Some(previous) = deleted
                .get(command.table_name())
                .and_then(|map| map.try_get_entry_for(command.as_ref()))
            else {
                continue;
            };
            if let Some(&before) = positions.get(&Arc::as_ptr(previous)) {
                tracing::trace!(
                    table = command.table_name(),
                    deleted = before,
                    inserted = index,
                    "Row delete before insert of the same key"
                );
                graph.add_edge(before, index);
            }
        }
    }

    fn build_graph<C: ModificationCommand>(&self, commands: &[Arc<C>]) -> Result<CommandGraph> {
        let mut graph = CommandGraph::new(commands.len());
        let mut by_table: HashMap<&str, Vec<usize>> = HashMap::new();
        for (index, command) in commands.iter().enumerate() {
            by_table.entry(command.table_name()).or_default().push(index);
        }

        for (table_name, dependents) in &by_table {
            let table = self.table(table_name)?;
            for foreign_key in table.foreign_keys() {
                let Some(principals) = by_table.get(foreign_key.principal_table()) else {
                    continue;
                };
                let factory = foreign_key.foreign_key_value_factory()?;
                let index = Self::index_principals(&factory, commands, principals);
                if index.is_empty() {
                    continue;
                }
                for &dependent in dependents {
                    Self::link_dependent(&factory, &index, commands, dependent, &mut graph);
                }
            }
        }
        Ok(graph)
    }

    /// Index the rows being inserted by their current key and the rows
    /// being deleted by their original key.
    fn index_principals<C: ModificationCommand>(
        factory: &ForeignKeyValueFactory,
        commands: &[Arc<C>],
        principals: &[usize],
    ) -> HashMap<KeyValueIndex, Vec<usize>> {
        let mut index: HashMap<KeyValueIndex, Vec<usize>> = HashMap::new();
        for &principal in principals {
            let command = commands[principal].as_ref();
            let token = match command.entity_state() {
                EntityState::Added => factory.create_principal_key_value_index(command, false),
                EntityState::Deleted => factory.create_principal_key_value_index(command, true),
                EntityState::Modified => None,
            };
            if let Some(token) = token {
                index.entry(token).or_default().push(principal);
            }
        }
        index
    }

    fn link_dependent<C: ModificationCommand>(
        factory: &ForeignKeyValueFactory,
        index: &HashMap<KeyValueIndex, Vec<usize>>,
        commands: &[Arc<C>],
        dependent: usize,
        graph: &mut CommandGraph,
    ) {
        let command = commands[dependent].as_ref();
        let state = command.entity_state();

        if matches!(state, EntityState::Added | EntityState::Modified) {
            if let Some(token) = factory.create_dependent_key_value_index(command, false) {
                for &principal in index.get(&token).into_iter().flatten() {
                    tracing::trace!(
                        foreign_key = token.foreign_key(),
                        principal,
                        dependent,
                        "Principal insert before dependent write"
                    );
                    graph.add_edge(principal, dependent);
                }
            }
        }

        if matches!(state, EntityState::Deleted | EntityState::Modified) {
            if let Some(token) = factory.create_dependent_key_value_index(command, true) {
                for &principal in index.get(&token).into_iter().flatten() {
                    tracing::trace!(
                        foreign_key = token.foreign_key(),
                        principal,
                        dependent,
                        "Dependent write before principal delete"
                    );
                    graph.add_edge(dependent, principal);
                }
            }
        }
    }
}
