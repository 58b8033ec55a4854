use actix::prelude::*;
use std::path::Path;
use std::time::Instant;

use rangedown::cli::Args;
use rangedown::config::Config;
use rangedown::core::error::LoaderError;
use rangedown::core::loader::{
    AwcClient, ChannelClient, GetBlock, IsDataAvailable, LoaderActor, LoaderEvent, LoaderState,
    QuerySnapshot, RequestData, StartLoad, TransferPhase,
};
use rangedown::core::range_store::ByteSpan;
use rangedown::ui::{print_error, print_success, LoadSummary, ProgressManager};
use rangedown::utils::logger::init_logger;
use rangedown::utils::validator::validate_output_path;

/// 服务器连续多少次没有返回新数据后放弃
const MAX_STALLED_ROUNDS: u32 = 3;

#[actix::main]
async fn main() {
    let args = match Args::parse_args() {
        Ok(args) => args,
        Err(e) => {
            print_error(&format!("参数解析失败: {}", e));
            std::process::exit(1);
        }
    };
    init_logger(args.verbose);

    let config = match args.load_config() {
        Ok(config) => config,
        Err(e) => {
            print_error(&e.to_string());
            std::process::exit(1);
        }
    };
    log::info!("配置文件路径: {}", args.config);
    log::debug!("{}", config.get_summary());

    match run(&args, &config).await {
        Ok(summary) => {
            if args.json {
                match serde_json::to_string_pretty(&summary) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        print_error(&format!("无法序列化摘要: {}", e));
                        std::process::exit(1);
                    }
                }
            } else {
                println!("{}", summary);
            }
        }
        Err(e) => {
            print_error(&format!("加载失败: {}", e));
            std::process::exit(1);
        }
    }
}

/// 加载文档，直到完整或者（关闭后台下载时）所有指定范围都已到达
async fn run(args: &Args, config: &Config) -> Result<LoadSummary, LoaderError> {
    let url = args.document_url()?.to_string();
    let output = args.output_path(config)?;
    validate_output_path(&output.to_string_lossy())
        .map_err(|e| LoaderError::Config(e.to_string()))?;

    if !args.json {
        print_success(&format!("开始加载 {}", url));
    }
    let started = Instant::now();

    let (client, mut events) = ChannelClient::channel();
    let loader = LoaderActor::new(config, AwcClient::new(config), client).start();
    loader
        .send(StartLoad { url: url.clone() })
        .await
        .map_err(|e| LoaderError::Unknown(format!("加载器不可用: {}", e)))??;
    for span in &args.ranges {
        loader.do_send(RequestData { offset: span.offset, size: span.size });
    }

    let mut progress = ProgressManager::new(args.json);
    let mut saved = None;
    let mut document_size = 0;
    let mut stalls = 0;
    while let Some(event) = events.recv().await {
        match event {
            LoaderEvent::NewDataAvailable { available, total_size } => {
                stalls = 0;
                progress.update_progress(available, total_size);
            }
            LoaderEvent::PartialDocumentLoaded { total_size } => {
                progress.set_total(total_size);
                log::info!("文档头部已就绪，大小 {} 字节", total_size);
                document_size = total_size;
                if !config.background_fill
                    && ranges_ready(&loader, &args.ranges, document_size).await?
                {
                    progress.finish("指定范围已就绪");
                    break;
                }
                resume_if_stalled(&loader, args, config, &mut stalls).await?;
            }
            LoaderEvent::PendingRequestComplete => {
                if !config.background_fill
                    && ranges_ready(&loader, &args.ranges, document_size).await?
                {
                    progress.finish("指定范围已就绪");
                    break;
                }
                resume_if_stalled(&loader, args, config, &mut stalls).await?;
            }
            LoaderEvent::DocumentComplete { total_size } => {
                progress.update_progress(total_size, total_size);
                progress.finish("完成");
                let block = loader
                    .send(GetBlock { offset: 0, size: total_size })
                    .await
                    .map_err(|e| LoaderError::Unknown(format!("加载器不可用: {}", e)))?
                    .ok_or_else(|| LoaderError::Unknown("文档数据不完整".to_string()))?;
                write_document(&output, &block).await?;
                saved = Some(output.display().to_string());
                break;
            }
            LoaderEvent::LoadFailed { error } => {
                progress.abandon("失败");
                return Err(LoaderError::Unknown(error));
            }
        }
    }

    let snapshot = loader
        .send(QuerySnapshot)
        .await
        .map_err(|e| LoaderError::Unknown(format!("加载器不可用: {}", e)))?;
    Ok(LoadSummary {
        url,
        complete: saved.is_some(),
        output: saved,
        total_size: snapshot.total_size,
        available: snapshot.available,
        requests_issued: snapshot.requests_issued,
        partial: snapshot.partial,
        elapsed_secs: started.elapsed().as_secs_f64(),
    })
}

async fn ranges_ready(
    loader: &Addr<LoaderActor<AwcClient>>,
    ranges: &[ByteSpan],
    document_size: u64,
) -> Result<bool, LoaderError> {
    // 超出文档末尾的部分不会被下载
    for span in ranges.iter().filter(|s| s.offset < document_size) {
        let size = span.size.min(document_size - span.offset);
        let available = loader
            .send(IsDataAvailable { offset: span.offset, size })
            .await
            .map_err(|e| LoaderError::Unknown(format!("加载器不可用: {}", e)))?;
        if !available {
            return Ok(false);
        }
    }
    Ok(true)
}

/// 加载器空闲且没有待处理的请求，说明上一次响应没有带来数据，需要重新请求
async fn resume_if_stalled(
    loader: &Addr<LoaderActor<AwcClient>>,
    args: &Args,
    config: &Config,
    stalls: &mut u32,
) -> Result<(), LoaderError> {
    let snapshot = loader
        .send(QuerySnapshot)
        .await
        .map_err(|e| LoaderError::Unknown(format!("加载器不可用: {}", e)))?;
    if snapshot.state != LoaderState::PartialDownload(TransferPhase::Idle)
        || snapshot.pending_requests > 0
    {
        return Ok(());
    }

    *stalls += 1;
    if *stalls > MAX_STALLED_ROUNDS {
        return Err(LoaderError::TruncatedRead {
            expected: snapshot.total_size,
            actual: snapshot.available,
        });
    }
    log::warn!("服务器没有返回数据，第 {} 次重新请求", stalls);
    if config.background_fill {
        loader.do_send(RequestData { offset: 0, size: snapshot.total_size });
    } else {
        for span in &args.ranges {
            loader.do_send(RequestData { offset: span.offset, size: span.size });
        }
    }
    Ok(())
}

async fn write_document(path: &Path, data: &[u8]) -> Result<(), LoaderError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, data).await?;
    log::info!("已保存 {} ({} 字节)", path.display(), data.len());
    Ok(())
}
