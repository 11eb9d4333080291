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

//! Memtable ingest benchmarks: duplicate append vs. aggregate merge, and
//! the hot-key pre-aggregation path.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};

use stratadb_core::{
    AggregationKind, ColumnType, Datum, KeyModel, Result, Schema, SchemaBuilder, SortSpec,
    TupleBuilder, TupleDescriptor, TupleRef,
};
use stratadb_storage::{MemTable, MemTracker, RowSetWriter, RowView};

struct NullWriter;

impl RowSetWriter for NullWriter {
    fn add_row(&mut self, _row: &RowView<'_>) -> Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

fn schema(agg: AggregationKind) -> Schema {
    SchemaBuilder::new()
        .key("k", ColumnType::Int64)
        .value("v", ColumnType::Int64, agg)
        .build()
        .unwrap()
}

fn make_memtable(schema: Schema, model: KeyModel) -> MemTable {
    let parent = MemTracker::root("bench", None);
    MemTable::new(
        1,
        Arc::new(schema),
        model,
        SortSpec::Lexicographic,
        Box::new(NullWriter),
        &parent,
    )
    .unwrap()
}

fn tuples(schema: &Schema, keys: impl Iterator<Item = i64>) -> (TupleDescriptor, Vec<Vec<u8>>) {
    let desc = TupleDescriptor::for_schema(schema);
    let rows = keys
        .map(|k| TupleBuilder::row(&desc, &[Datum::Int64(k), Datum::Int64(1)]).unwrap())
        .collect();
    (desc, rows)
}

fn bench_insert(c: &mut Criterion) {
    const ROWS: u64 = 10_000;

    let mut group = c.benchmark_group("memtable_insert");
    group.throughput(Throughput::Elements(ROWS));

    group.bench_function("duplicate_random_keys", |b| {
        let s = schema(AggregationKind::None);
        let (desc, rows) = tuples(
            &s,
            (0..ROWS).map(|i| (i.wrapping_mul(0x9E3779B97F4A7C15) % ROWS) as i64),
        );
        b.iter_batched(
            || make_memtable(s.clone(), KeyModel::Duplicate),
            |mut mt| {
                for row in &rows {
                    let tuple = TupleRef::new(&desc, row).unwrap();
                    mt.insert(&tuple).unwrap();
                }
                black_box(mt.rows())
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("aggregate_hot_keys", |b| {
        // 64 distinct keys: nearly every insert merges in place.
        let s = schema(AggregationKind::Sum);
        let (desc, rows) = tuples(&s, (0..ROWS).map(|i| (i % 64) as i64));
        b.iter_batched(
            || make_memtable(s.clone(), KeyModel::Aggregate),
            |mut mt| {
                for row in &rows {
                    let tuple = TupleRef::new(&desc, row).unwrap();
                    mt.insert(&tuple).unwrap();
                }
                black_box(mt.rows())
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("aggregate_distinct_keys", |b| {
        let s = schema(AggregationKind::Sum);
        let (desc, rows) = tuples(&s, (0..ROWS).map(|i| i as i64));
        b.iter_batched(
            || make_memtable(s.clone(), KeyModel::Aggregate),
            |mut mt| {
                for row in &rows {
                    let tuple = TupleRef::new(&desc, row).unwrap();
                    mt.insert(&tuple).unwrap();
                }
                black_box(mt.rows())
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

fn bench_flush(c: &mut Criterion) {
    const ROWS: u64 = 10_000;

    c.bench_function("memtable_flush_10k", |b| {
        let s = schema(AggregationKind::None);
        let (desc, rows) = tuples(&s, (0..ROWS).map(|i| i as i64));
        b.iter_batched(
            || {
                let mut mt = make_memtable(s.clone(), KeyModel::Duplicate);
                for row in &rows {
                    let tuple = TupleRef::new(&desc, row).unwrap();
                    mt.insert(&tuple).unwrap();
                }
                mt
            },
            |mut mt| {
                mt.flush().unwrap();
                black_box(mt.flush_size())
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, bench_insert, bench_flush);
criterion_main!(benches);
