use criterion::{black_box, criterion_group, criterion_main, Criterion};
use eleve_core::{InMemoryStorage, NgramStore, Segmenter};

fn synthetic_corpus() -> Vec<Vec<&'static str>> {
    let vocab = [
        "le", "petit", "chat", "mange", "la", "souris", "dans", "le", "jardin", "hot", "dog",
        "je", "vous", "parle", "de", "pas", "ou", "sandwich", "ador", "les",
    ];
    (0..500)
        .map(|i| {
            let len = 4 + (i % 5);
            (0..len).map(|j| vocab[(i + j) % vocab.len()]).collect()
        })
        .collect()
}

fn bench_training(c: &mut Criterion) {
    let corpus = synthetic_corpus();
    c.bench_function("train_500_sentences", |b| {
        b.iter(|| {
            let mut storage = InMemoryStorage::new(5);
            for sentence in &corpus {
                let tokens: Vec<_> = sentence.iter().map(eleve_core::Token::word).collect();
                storage.add_ngram(black_box(&tokens), 1).unwrap();
            }
            storage
        })
    });
}

fn bench_update_stats(c: &mut Criterion) {
    let corpus = synthetic_corpus();
    let mut storage = InMemoryStorage::new(5);
    for sentence in &corpus {
        let tokens: Vec<_> = sentence.iter().map(eleve_core::Token::word).collect();
        storage.add_ngram(&tokens, 1).unwrap();
    }
    c.bench_function("update_stats_500_sentences", |b| {
        b.iter(|| storage.update_stats())
    });
}

fn bench_segment(c: &mut Criterion) {
    let corpus = synthetic_corpus();
    let mut storage = InMemoryStorage::new(5);
    for sentence in &corpus {
        storage
            .add_sentence(
                &sentence.iter().map(eleve_core::Token::word).collect::<Vec<_>>(),
                1,
                None,
            )
            .unwrap();
    }
    storage.update_stats();
    let segmenter = Segmenter::new(&storage, 4).unwrap();
    let sentence: Vec<_> = vec!["je", "deteste", "les", "hot", "dog"]
        .into_iter()
        .map(eleve_core::Token::word)
        .collect();

    c.bench_function("segment_short_sentence", |b| {
        b.iter(|| segmenter.segment(black_box(&sentence)))
    });
}

criterion_group!(benches, bench_training, bench_update_stats, bench_segment);
criterion_main!(benches);
