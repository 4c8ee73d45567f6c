use std::collections::BTreeSet;
use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use deminer_core::{choose_action, infer, risk, Cell, Knowledge, RiskConfig};

const ROWS: u32 = 12;
const COLS: u32 = 12;

fn has_mine(row: u32, col: u32) -> bool {
    (row * 31 + col * 17) % 7 == 0
}

fn adjacent_mines(row: u32, col: u32) -> u8 {
    let mut count = 0;
    for dr in -1i64..=1 {
        for dc in -1i64..=1 {
            if dr == 0 && dc == 0 {
                continue;
            }
            let (nr, nc) = (row as i64 + dr, col as i64 + dc);
            if (0..ROWS as i64).contains(&nr)
                && (0..COLS as i64).contains(&nc)
                && has_mine(nr as u32, nc as u32)
            {
                count += 1;
            }
        }
    }
    count
}

/// Mid-game position: the top half of a fixed layout is revealed wherever it
/// is safe, everything else is still unknown.
fn mid_game_board() -> Knowledge {
    let mut knowledge = Knowledge::new(ROWS, COLS);
    for row in 0..ROWS / 2 {
        for col in 0..COLS {
            if !has_mine(row, col) {
                knowledge
                    .set((row, col), Cell::Revealed(adjacent_mines(row, col)))
                    .unwrap();
            }
        }
    }
    knowledge
}

fn total_mines() -> u32 {
    (0..ROWS)
        .flat_map(|row| (0..COLS).map(move |col| (row, col)))
        .filter(|&(row, col)| has_mine(row, col))
        .count() as u32
}

fn bench_inference(c: &mut Criterion) {
    let knowledge = mid_game_board();
    let no_positions = BTreeSet::new();
    let config = RiskConfig::default();
    let mines = total_mines();

    c.bench_function("infer/mid_game", |b| {
        b.iter(|| infer(black_box(&knowledge), &no_positions).unwrap())
    });

    c.bench_function("risk/mid_game", |b| {
        b.iter(|| risk(black_box(&knowledge), &no_positions, Some(mines), &config).unwrap())
    });

    c.bench_function("choose_action/mid_game", |b| {
        b.iter(|| {
            choose_action(
                black_box(&knowledge),
                &no_positions,
                &no_positions,
                Some(mines),
                &config,
            )
            .unwrap()
        })
    });
}

criterion_group!(benches, bench_inference);
criterion_main!(benches);
