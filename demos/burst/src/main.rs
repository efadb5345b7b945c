use std::sync::Arc;
use std::time::Duration;
use tandoor::{
    Batch, BatchConfig, BatchService, Batcher, Executor, ExecutorError, ExecutorSettings,
    InputField, Inputs, Precision, ServiceConfig, TaskKind,
};

/// Pretends to denoise: a fixed cost per batch, whatever its size.
struct SlowExecutor;

impl Executor for SlowExecutor {
    type Output = (String, usize);

    fn execute(&self, batch: Batch, _samples_per_task: usize) -> Result<Vec<Self::Output>, ExecutorError> {
        std::thread::sleep(Duration::from_millis(40));
        let prompts = batch
            .texts(InputField::Prompt)
            .ok_or_else(|| ExecutorError::new("batch has no prompts"))?;
        Ok(prompts.into_iter().map(|p| (p.to_string(), batch.len())).collect())
    }
}

#[tokio::main]
async fn main() {
    let config = ServiceConfig {
        task: TaskKind::TextToImage,
        batching: BatchConfig {
            max_batch_size: 8,
            max_wait: Duration::from_millis(25),
        },
        executor: ExecutorSettings {
            model: String::new(),
            precision: Precision::Fp16,
            steps: 30,
        },
    };
    let service = Arc::new(BatchService::start(config, SlowExecutor).expect("valid config"));

    let handles = (0..100).map(|e| {
        let svc = service.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(e * 2)).await;
            match svc.generate(Inputs::new().with_prompt(format!("lantern #{e}"))).await {
                Ok((prompt, batch_size)) => println!("{prompt} ran in a batch of {batch_size}"),
                Err(err) => println!("request {e} failed: {err}"),
            }
        })
    }).collect::<Vec<_>>();

    for handle in futures::future::join_all(handles).await {
        if let Err(e) = handle {
            println!("Err joining handle: {:?}", e);
        }
    }

    service.shutdown().await;
}
