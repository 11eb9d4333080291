// SPDX-License-Identifier: AGPL-3.0-or-later
// StrataDB - Columnar Analytical Storage Engine
// Copyright (C) 2026 Sushanth Reddy Vanagala (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! StrataDB core types
//!
//! Shared vocabulary between the ingest path and the storage crates:
//!
//! - **Errors** (`error`): the engine-wide error enum and `Result` alias
//! - **Schemas** (`schema`): column types, aggregation kinds, key models,
//!   sort disciplines, and the tablet schema builder
//! - **Tuples** (`tuple`): the upstream input-row contract (null bits +
//!   value slots over one contiguous buffer)
//! - **Values** (`value`): decoded cell values (`Datum`)

pub mod error;
pub mod schema;
pub mod tuple;
pub mod value;

pub use error::{Result, StrataError};
pub use schema::{
    AggregationKind, ColumnSchema, ColumnType, KeyModel, Schema, SchemaBuilder, SortSpec,
};
pub use tuple::{SlotDescriptor, SlotKind, TupleBuilder, TupleDescriptor, TupleRef};
pub use value::Datum;
